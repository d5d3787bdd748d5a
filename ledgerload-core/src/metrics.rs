/// Metric names recorded for every submission attempt.
#[derive(Copy, Clone, Debug)]
pub struct SubmissionLabels {
    pub success: &'static str,
    pub error: &'static str,
    pub retry: &'static str,
    pub latency: &'static str,
}

#[macro_export]
macro_rules! generate_labels {
    ($base_name:ident) => {
        $crate::SubmissionLabels {
            success: concat!(stringify!($base_name), "_success"),
            error: concat!(stringify!($base_name), "_error"),
            retry: concat!(stringify!($base_name), "_retry"),
            latency: concat!(stringify!($base_name), "_latency"),
        }
    };
}

pub const SUBMISSION_LABELS: SubmissionLabels = generate_labels!(ledgerload_submission);
