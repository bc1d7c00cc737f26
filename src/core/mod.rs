pub mod usp;

// Re-export commonly used types for convenience
pub use usp::{
    AuthConfig, AuthenticationKind, Connection, ConnectionState, EndpointKind, OutputFormat,
    RecognitionMode, SessionConfig, TranslationConfig, UspCallbacks, UspError, UspResult,
};
