// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Reconciliation outcome for a single payment. FULLY_RECONCILED is terminal;
/// every other non-error state may be revisited by a refinement batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconStatus {
    Unmatched,
    FullyReconciled,
    AutoAllocated,
    ScholarshipVerified,
    PendingReview,
    ExceptionError,
}

impl ReconStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::FullyReconciled => "fully_reconciled",
            Self::AutoAllocated => "auto_allocated",
            Self::ScholarshipVerified => "scholarship_verified",
            Self::PendingReview => "pending_review",
            Self::ExceptionError => "exception_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unmatched" => Some(Self::Unmatched),
            "fully_reconciled" => Some(Self::FullyReconciled),
            "auto_allocated" => Some(Self::AutoAllocated),
            "scholarship_verified" => Some(Self::ScholarshipVerified),
            "pending_review" => Some(Self::PendingReview),
            "exception_error" => Some(Self::ExceptionError),
            _ => None,
        }
    }

    /// Success states count toward a batch's successful_matches.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::FullyReconciled | Self::AutoAllocated | Self::ScholarshipVerified
        )
    }
}

impl std::fmt::Display for ReconStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceLevel {
    pub fn from_score(score: i64) -> Self {
        if score >= 80 {
            Self::High
        } else if score >= 60 {
            Self::Medium
        } else if score >= 40 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::VeryLow => "very_low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchType {
    Initial,
    Refinement,
    Manual,
    Scheduled,
}

impl BatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Refinement => "refinement",
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(Self::Initial),
            "refinement" => Some(Self::Refinement),
            "manual" => Some(Self::Manual),
            "scheduled" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Partial,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentType {
    MissingScholarshipRecord,
    ScholarshipOverapplied,
    ScholarshipUnderapplied,
    ScholarshipVariance,
    PricingVariance,
    ClericalError,
    TimingDifference,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingScholarshipRecord => "missing_scholarship_record",
            Self::ScholarshipOverapplied => "scholarship_overapplied",
            Self::ScholarshipUnderapplied => "scholarship_underapplied",
            Self::ScholarshipVariance => "scholarship_variance",
            Self::PricingVariance => "pricing_variance",
            Self::ClericalError => "clerical_error",
            Self::TimingDifference => "timing_difference",
        }
    }
}

impl std::fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdContext {
    IndividualPayment,
    StudentAccount,
    BatchTotal,
    PeriodAggregate,
    ErrorCategory,
}

impl ThresholdContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndividualPayment => "individual_payment",
            Self::StudentAccount => "student_account",
            Self::BatchTotal => "batch_total",
            Self::PeriodAggregate => "period_aggregate",
            Self::ErrorCategory => "error_category",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "individual_payment" => Some(Self::IndividualPayment),
            "student_account" => Some(Self::StudentAccount),
            "batch_total" => Some(Self::BatchTotal),
            "period_aggregate" => Some(Self::PeriodAggregate),
            "error_category" => Some(Self::ErrorCategory),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: i64,
    pub student_id: i64,
    pub term_id: i64,
    pub amount: f64,
    pub currency: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    /// Invoiced amount before any discount, when the legacy record carries it.
    pub invoice_amount: Option<f64>,
    pub received_date: String,
}

#[derive(Debug, Clone)]
pub struct Term {
    pub id: i64,
    pub name: String,
    pub cycle: Option<String>,
    pub start_date: String,
    pub end_date: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub term_id: i64,
    pub course_id: i64,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Scholarship {
    pub id: i64,
    pub student_id: i64,
    pub name: String,
    pub percentage: Option<f64>,
    pub fixed_amount: Option<f64>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub cycle: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct StatusRow {
    pub id: i64,
    pub payment_id: i64,
    pub status: ReconStatus,
    pub confidence_level: Option<String>,
    pub confidence_score: Option<i64>,
    pub pricing_method: Option<String>,
    pub variance_amount: f64,
    pub variance_percentage: f64,
    pub refinement_attempts: i64,
    pub last_attempt_at: Option<String>,
    pub error_category: Option<String>,
    pub error_details: Option<String>,
    pub batch_id: Option<i64>,
    pub notes: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: i64,
    pub name: String,
    pub rule_type: String,
    pub parameters: String,
    pub confidence_threshold: i64,
    pub priority: i64,
    pub is_active: bool,
    pub times_applied: i64,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Threshold {
    pub id: i64,
    pub context: ThresholdContext,
    pub absolute_limit: f64,
    pub percentage_limit: Option<f64>,
    pub effective_date: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: i64,
    pub name: String,
    pub batch_type: BatchType,
    pub status: BatchStatus,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub total_payments: i64,
    pub processed_payments: i64,
    pub successful_matches: i64,
    pub failed_matches: i64,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub results_summary: Option<String>,
}

impl Batch {
    pub fn success_rate(&self) -> f64 {
        if self.processed_payments == 0 {
            0.0
        } else {
            self.successful_matches as f64 / self.processed_payments as f64 * 100.0
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Adjustment {
    pub id: i64,
    pub adjustment_type: String,
    pub description: Option<String>,
    pub original_amount: f64,
    pub adjusted_amount: f64,
    pub variance: f64,
    pub payment_id: i64,
    pub student_id: Option<i64>,
    pub term_id: Option<i64>,
    pub batch_id: Option<i64>,
    pub requires_approval: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub created_at: Option<String>,
}

impl Adjustment {
    pub fn awaiting_approval(&self) -> bool {
        self.requires_approval && self.approved_by.is_none()
    }
}

// ---------------------------------------------------------------------------
// Match result
// ---------------------------------------------------------------------------

/// Uniform output of an accepted matching tier, consumed by the shared
/// status-write and adjustment-write paths.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub method: String,
    pub status: ReconStatus,
    pub confidence_score: Option<i64>,
    /// Amount the evidence says should apply (expected price or discount).
    pub expected_amount: f64,
    /// Amount actually observed.
    pub actual_amount: f64,
    pub variance_amount: f64,
    pub variance_percentage: f64,
    pub matched_enrollments: Vec<i64>,
    /// Scholarship indicators present but no award on file.
    pub missing_scholarship: bool,
    /// Variance belongs to the scholarship domain rather than pricing.
    pub scholarship_domain: bool,
    pub note: Option<String>,
}

impl MatchResult {
    pub fn over_applied(&self) -> bool {
        self.actual_amount > self.expected_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            ReconStatus::Unmatched,
            ReconStatus::FullyReconciled,
            ReconStatus::AutoAllocated,
            ReconStatus::ScholarshipVerified,
            ReconStatus::PendingReview,
            ReconStatus::ExceptionError,
        ] {
            assert_eq!(ReconStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(ReconStatus::parse("bogus"), None);
    }

    #[test]
    fn test_success_states() {
        assert!(ReconStatus::FullyReconciled.is_success());
        assert!(ReconStatus::AutoAllocated.is_success());
        assert!(ReconStatus::ScholarshipVerified.is_success());
        assert!(!ReconStatus::PendingReview.is_success());
        assert!(!ReconStatus::ExceptionError.is_success());
        assert!(!ReconStatus::Unmatched.is_success());
    }

    #[test]
    fn test_confidence_level_boundaries() {
        assert_eq!(ConfidenceLevel::from_score(100), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(80), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(79), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(60), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(40), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(30), ConfidenceLevel::VeryLow);
    }

    #[test]
    fn test_batch_success_rate() {
        let mut batch = Batch {
            id: 1,
            name: "t".into(),
            batch_type: BatchType::Initial,
            status: BatchStatus::Processing,
            from_date: None,
            to_date: None,
            total_payments: 4,
            processed_payments: 4,
            successful_matches: 3,
            failed_matches: 1,
            started_at: None,
            completed_at: None,
            results_summary: None,
        };
        assert_eq!(batch.success_rate(), 75.0);
        batch.processed_payments = 0;
        batch.successful_matches = 0;
        assert_eq!(batch.success_rate(), 0.0);
    }

    #[test]
    fn test_over_applied_direction() {
        let result = MatchResult {
            method: "scholarship".into(),
            status: ReconStatus::ScholarshipVerified,
            confidence_score: Some(80),
            expected_amount: 20.0,
            actual_amount: 25.0,
            variance_amount: 5.0,
            variance_percentage: 5.0,
            matched_enrollments: vec![],
            missing_scholarship: false,
            scholarship_domain: true,
            note: None,
        };
        assert!(result.over_applied());
    }
}
