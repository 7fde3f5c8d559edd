use crate::phone::normalize_phone;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    SuperAdmin,
    Admin,
    Guru,
    Wali,
}

/// The caller's identity, passed explicitly with each request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub role: Role,
    #[serde(default)]
    pub assigned_halaqah_ids: Vec<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Which students a user may read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentScope {
    All,
    Halaqah(Vec<String>),
    /// Normalized guardian phone. Empty matches nothing.
    GuardianPhone(String),
}

impl CurrentUser {
    pub fn from_params(params: &serde_json::Value) -> Result<Self, String> {
        let Some(raw) = params.get("currentUser") else {
            return Err("missing currentUser".to_string());
        };
        serde_json::from_value(raw.clone()).map_err(|e| format!("invalid currentUser: {e}"))
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::SuperAdmin | Role::Admin)
    }

    pub fn teaches(&self, halaqah_id: &str) -> bool {
        self.role == Role::Guru && self.assigned_halaqah_ids.iter().any(|id| id == halaqah_id)
    }

    /// Admins, and gurus for their own halaqah, may write records for a student.
    pub fn can_manage(&self, halaqah_id: &str) -> bool {
        self.is_admin() || self.teaches(halaqah_id)
    }

    pub fn is_guardian_of(&self, guardian_phone: Option<&str>, country_code: &str) -> bool {
        if self.role != Role::Wali {
            return false;
        }
        let mine = normalize_phone(self.phone.as_deref().unwrap_or(""), country_code);
        let theirs = normalize_phone(guardian_phone.unwrap_or(""), country_code);
        !mine.is_empty() && mine == theirs
    }

    pub fn can_view(&self, halaqah_id: &str, guardian_phone: Option<&str>, country_code: &str) -> bool {
        self.can_manage(halaqah_id) || self.is_guardian_of(guardian_phone, country_code)
    }

    pub fn student_scope(&self, country_code: &str) -> StudentScope {
        match self.role {
            Role::SuperAdmin | Role::Admin => StudentScope::All,
            Role::Guru => StudentScope::Halaqah(self.assigned_halaqah_ids.clone()),
            Role::Wali => StudentScope::GuardianPhone(normalize_phone(
                self.phone.as_deref().unwrap_or(""),
                country_code,
            )),
        }
    }
}
