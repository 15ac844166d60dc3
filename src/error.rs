use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Short classification used when a failure is reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Device,
    Protocol,
    Collaborator,
    Connectivity,
    Config,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorClass::Device => "device",
            ErrorClass::Protocol => "protocol",
            ErrorClass::Collaborator => "collaborator",
            ErrorClass::Connectivity => "connectivity",
            ErrorClass::Config => "config",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio overrun: {0} samples dropped")]
    Overrun(usize),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Connection error: {0}")]
    Connectivity(String),

    #[error("Gave up after {attempts} connection attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Device(_)
            | PipelineError::Overrun(_)
            | PipelineError::Playback(_)
            | PipelineError::Io(_) => ErrorClass::Device,
            PipelineError::Protocol(_) => ErrorClass::Protocol,
            PipelineError::Recognition(_)
            | PipelineError::Generation(_)
            | PipelineError::Synthesis(_) => ErrorClass::Collaborator,
            PipelineError::Connectivity(_) | PipelineError::RetriesExhausted { .. } => {
                ErrorClass::Connectivity
            }
            PipelineError::Config(_) => ErrorClass::Config,
        }
    }

    /// Only retry exhaustion, device-open failures and bad configuration may stop a process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::RetriesExhausted { .. }
                | PipelineError::Device(_)
                | PipelineError::Config(_)
        )
    }
}

impl From<cpal::DevicesError> for PipelineError {
    fn from(err: cpal::DevicesError) -> Self {
        PipelineError::Device(err.to_string())
    }
}

impl From<cpal::DeviceNameError> for PipelineError {
    fn from(err: cpal::DeviceNameError) -> Self {
        PipelineError::Device(err.to_string())
    }
}

impl From<cpal::SupportedStreamConfigsError> for PipelineError {
    fn from(err: cpal::SupportedStreamConfigsError) -> Self {
        PipelineError::Device(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for PipelineError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        PipelineError::Device(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for PipelineError {
    fn from(err: cpal::BuildStreamError) -> Self {
        PipelineError::Device(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for PipelineError {
    fn from(err: cpal::PlayStreamError) -> Self {
        PipelineError::Device(err.to_string())
    }
}

impl From<cpal::PauseStreamError> for PipelineError {
    fn from(err: cpal::PauseStreamError) -> Self {
        PipelineError::Device(err.to_string())
    }
}

impl From<hound::Error> for PipelineError {
    fn from(err: hound::Error) -> Self {
        PipelineError::Protocol(format!("wav: {}", err))
    }
}
