/// Registration stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationStage {
    Reference,
    Registration,
    AlternateChannel,
    Cropping,
}

impl std::fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference => write!(f, "Building reference image"),
            Self::Registration => write!(f, "Registering frames"),
            Self::AlternateChannel => write!(f, "Shifting second channel"),
            Self::Cropping => write!(f, "Computing valid region"),
        }
    }
}

/// Thread-safe progress reporting for a registration session.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of frames the
    /// stage will process, if known.
    fn begin_stage(&self, _stage: RegistrationStage, _total_items: Option<usize>) {}

    /// `items_done` frames of the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Progress reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
