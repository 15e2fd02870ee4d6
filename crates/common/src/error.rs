//! Error types shared across Inlay crates.

use std::path::PathBuf;

/// Top-level error type for Inlay operations.
///
/// Every variant except the ambient ones (`Io`, `Json`, `Other`) is fatal for
/// the render job that produced it. Dropped overlay references are not errors;
/// they surface as plan warnings instead.
#[derive(Debug, thiserror::Error)]
pub enum InlayError {
    #[error("Probe error for {path}: {message}")]
    Probe { path: PathBuf, message: String },

    #[error("Acquisition failed for {reference}: {message}")]
    Acquisition { reference: String, message: String },

    /// The render engine exited unsuccessfully. `diagnostic` is the engine's
    /// stderr, unmodified.
    #[error("Render engine failed ({}): {diagnostic}", exit_label(.exit_code))]
    RenderEngine {
        exit_code: Option<i32>,
        diagnostic: String,
    },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Render cancelled")]
    Cancelled,

    #[error("Plan error: {message}")]
    Plan { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using InlayError.
pub type InlayResult<T> = Result<T, InlayError>;

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl InlayError {
    pub fn probe(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn acquisition(reference: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Acquisition {
            reference: reference.into(),
            message: msg.into(),
        }
    }

    pub fn render_engine(exit_code: Option<i32>, diagnostic: impl Into<String>) -> Self {
        Self::RenderEngine {
            exit_code,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn plan(msg: impl Into<String>) -> Self {
        Self::Plan {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Raw diagnostic text from the render engine, if this is an engine failure.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::RenderEngine { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_engine_error_keeps_diagnostic_verbatim() {
        let raw = "[AVFilterGraph] No such filter: 'ovrlay'\nError initializing complex filters.";
        let err = InlayError::render_engine(Some(1), raw);
        assert_eq!(err.diagnostic(), Some(raw));
        assert!(err.to_string().contains("exit code 1"));
        assert!(err.to_string().ends_with(raw));
    }

    #[test]
    fn test_signal_termination_label() {
        let err = InlayError::render_engine(None, "");
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn test_acquisition_error_names_reference() {
        let err = InlayError::acquisition("https://cdn.example.com/b1.mp4", "HTTP 404");
        assert!(err.to_string().contains("https://cdn.example.com/b1.mp4"));
        assert!(err.diagnostic().is_none());
    }
}
