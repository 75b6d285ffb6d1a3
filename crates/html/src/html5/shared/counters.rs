//! Optional counters for instrumentation.

#[derive(Clone, Debug, Default)]
pub struct Counters {
    pub tokens_processed: u64,
    pub parse_errors: u64,
    pub adoption_agency_runs: u64,
    pub formatting_reconstructions: u64,
}
