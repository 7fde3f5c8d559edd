use serde::Serialize;

/// 1-decimal rounding, half up: `floor(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_off_1_decimal(100.0 * part as f64 / whole as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetoranEntry {
    pub ayat_from: i64,
    pub ayat_to: i64,
    pub mistakes: i64,
    pub score: f64,
}

impl SetoranEntry {
    pub fn ayat_count(&self) -> i64 {
        self.ayat_to
            .saturating_sub(self.ayat_from)
            .saturating_add(1)
            .max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Mutqin,
    Mutawassith,
    Dhaif,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierThresholds {
    pub mutqin_min: f64,
    pub mutawassith_min: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        TierThresholds {
            mutqin_min: 85.0,
            mutawassith_min: 70.0,
        }
    }
}

impl TierThresholds {
    pub fn tier_for(&self, average: f64) -> Tier {
        if average >= self.mutqin_min {
            Tier::Mutqin
        } else if average >= self.mutawassith_min {
            Tier::Mutawassith
        } else {
            Tier::Dhaif
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetoranSummary {
    pub count: usize,
    pub average_score: f64,
    pub total_ayat: i64,
    pub total_mistakes: i64,
    pub tier: Option<Tier>,
}

pub fn summarize_setoran(entries: &[SetoranEntry], thresholds: &TierThresholds) -> SetoranSummary {
    if entries.is_empty() {
        return SetoranSummary {
            count: 0,
            average_score: 0.0,
            total_ayat: 0,
            total_mistakes: 0,
            tier: None,
        };
    }
    let sum: f64 = entries.iter().map(|e| e.score).sum();
    let average_score = round_off_1_decimal(sum / entries.len() as f64);
    SetoranSummary {
        count: entries.len(),
        average_score,
        total_ayat: entries
            .iter()
            .map(SetoranEntry::ayat_count)
            .fold(0, i64::saturating_add),
        total_mistakes: entries
            .iter()
            .map(|e| e.mistakes)
            .fold(0, i64::saturating_add),
        tier: Some(thresholds.tier_for(average_score)),
    }
}

/// One student's checklist for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyCheck {
    pub present: bool,
    pub on_time: bool,
    pub prayer: bool,
    pub manners: bool,
}

impl DailyCheck {
    const INDICATORS: usize = 4;

    fn satisfied(&self) -> usize {
        [self.present, self.on_time, self.prayer, self.manners]
            .iter()
            .filter(|v| **v)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub days: usize,
    pub present_days: usize,
    pub attendance_percent: f64,
    pub on_time_percent: f64,
    pub prayer_percent: f64,
    pub manners_percent: f64,
    pub compliance_percent: f64,
    pub meets_minimum: bool,
}

pub fn summarize_days(days: &[DailyCheck], minimum_percent: f64) -> AttendanceSummary {
    let count = |f: fn(&DailyCheck) -> bool| days.iter().filter(|d| f(d)).count();
    let present_days = count(|d| d.present);
    let attendance_percent = percent(present_days, days.len());
    let satisfied: usize = days.iter().map(DailyCheck::satisfied).sum();
    AttendanceSummary {
        days: days.len(),
        present_days,
        attendance_percent,
        on_time_percent: percent(count(|d| d.on_time), days.len()),
        prayer_percent: percent(count(|d| d.prayer), days.len()),
        manners_percent: percent(count(|d| d.manners), days.len()),
        compliance_percent: percent(satisfied, days.len() * DailyCheck::INDICATORS),
        meets_minimum: !days.is_empty() && attendance_percent >= minimum_percent,
    }
}
