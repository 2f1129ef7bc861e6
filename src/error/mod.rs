use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

pub mod codes;

pub use codes::ErrorCode;

/// The unified error type for the worker.
///
/// Every variant is fatal to the current run; the top-level driver prints it and exits with
/// [`WorkerError::exit_code`]. Recoverable conditions (undecodable responses, missing result
/// files, failed progress reports) never surface as a `WorkerError`.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Transport error: {message}")]
    Transport {
        code: u16,
        message: String,
        endpoints: Vec<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Service error: {message}")]
    Service {
        code: u16,
        message: String,
        service: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Acquisition error: {message}")]
    Acquisition {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Adapter error: {message}")]
    Adapter {
        code: u16,
        message: String,
        adapter: Option<String>,
        exit_code: Option<i32>,
        log_tail: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Code base error: {message}")]
    CodeBase {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Filesystem error: {message}")]
    Io {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl WorkerError {
    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// All endpoints of a pool were tried without a transport-level response
    pub fn transport_exhausted(message: impl Into<String>, endpoints: Vec<String>) -> Self {
        Self::Transport {
            code: ErrorCode::TRANSPORT_EXHAUSTED,
            message: message.into(),
            endpoints,
            source: None,
        }
    }

    /// Create a transport error with specific code
    pub fn transport_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            code,
            message: message.into(),
            endpoints: Vec::new(),
            source: None,
        }
    }

    /// Create a service error with specific code and service name
    pub fn service_with_code(
        code: u16,
        message: impl Into<String>,
        service: Option<String>,
    ) -> Self {
        Self::Service {
            code,
            message: message.into(),
            service,
            source: None,
        }
    }

    /// Create an acquisition error with specific code
    pub fn acquisition_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Acquisition {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create an adapter error with specific code
    pub fn adapter_with_code(
        code: u16,
        message: impl Into<String>,
        adapter: Option<String>,
    ) -> Self {
        Self::Adapter {
            code,
            message: message.into(),
            adapter,
            exit_code: None,
            log_tail: None,
            source: None,
        }
    }

    /// Create a code base error with specific code and path
    pub fn code_base_with_code(
        code: u16,
        message: impl Into<String>,
        path: Option<PathBuf>,
    ) -> Self {
        Self::CodeBase {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Create a filesystem error with specific code and path
    pub fn io_with_code(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Io {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::Transport { source: src, .. }
            | Self::Service { source: src, .. }
            | Self::Acquisition { source: src, .. }
            | Self::Adapter { source: src, .. }
            | Self::CodeBase { source: src, .. }
            | Self::Io { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::Transport { message, .. }
            | Self::Service { message, .. }
            | Self::Acquisition { message, .. }
            | Self::Adapter { message, .. }
            | Self::CodeBase { message, .. }
            | Self::Io { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
        }
        self
    }

    /// Set the exit code for an adapter error
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        if let Self::Adapter {
            exit_code: ref mut ec,
            ..
        } = self
        {
            *ec = Some(exit_code);
        }
        self
    }

    /// Attach the tail of the captured adapter log
    pub fn with_log_tail(mut self, tail: impl Into<String>) -> Self {
        if let Self::Adapter {
            log_tail: ref mut lt,
            ..
        } = self
        {
            *lt = Some(tail.into());
        }
        self
    }

    /// Process exit code the driver terminates with.
    ///
    /// Running out of acquisition budget ends the run cleanly; code base installation failures
    /// use their own code so that schedulers can tell a broken bundle from a broken run.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Acquisition { .. } => 0,
            Self::CodeBase { .. } => 2,
            Self::Config { .. }
            | Self::Transport { .. }
            | Self::Service { .. }
            | Self::Adapter { .. }
            | Self::Io { .. }
            | Self::Other { .. } => 1,
        }
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Transport { code, .. }
            | Self::Service { code, .. }
            | Self::Acquisition { code, .. }
            | Self::Adapter { code, .. }
            | Self::CodeBase { code, .. }
            | Self::Io { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// Captured adapter log tail, if this error carries one
    pub fn log_tail(&self) -> Option<&str> {
        match self {
            Self::Adapter { log_tail, .. } => log_tail.as_deref(),
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message, .. } => format!("Configuration problem: {}", message),
            Self::Transport {
                message, endpoints, ..
            } => {
                if endpoints.is_empty() {
                    format!("Transport error: {}", message)
                } else {
                    format!("{} (tried {})", message, endpoints.join(", "))
                }
            }
            Self::Service {
                message, service, ..
            } => match service {
                Some(name) => format!("Service '{}' error: {}", name, message),
                None => format!("Service error: {}", message),
            },
            Self::Acquisition { message, .. } => message.clone(),
            Self::Adapter {
                message,
                adapter,
                exit_code,
                ..
            } => {
                let mut msg = String::from("Adapter");
                if let Some(name) = adapter {
                    msg.push_str(&format!(" '{}'", name));
                }
                msg.push_str(" failed");
                if let Some(code) = exit_code {
                    msg.push_str(&format!(" with exit code {}", code));
                }
                format!("{}: {}", msg, message)
            }
            Self::CodeBase { message, path, .. } | Self::Io { message, path, .. } => match path {
                Some(p) => format!("{} ({})", message, p.display()),
                None => message.clone(),
            },
            Self::Other { message, .. } => message.clone(),
        }
    }
}

/// Type alias for Results using WorkerError
pub type Result<T> = std::result::Result<T, WorkerError>;

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::io_with_code(ErrorCode::IO_GENERIC, "IO operation failed", None)
            .with_source(err)
    }
}

impl From<tokio::task::JoinError> for WorkerError {
    fn from(err: tokio::task::JoinError) -> Self {
        WorkerError::Other {
            code: ErrorCode::OTHER_TASK_FAILED,
            message: "Background task did not complete".to_string(),
            source: None,
        }
        .with_source(err)
    }
}
