//! Connection and option configuration (spec §6 "Configuration options").
//!
//! Generalizes the teacher's `StreamConfig` (`src/lib.rs` of the original
//! single-endpoint binary) into the full option set the sinker core exposes.

use std::time::Duration;

use tokio_retry::strategy::ExponentialBackoff;

use crate::auth::Authenticator;
use crate::block_range::BlockRange;
use crate::error::SinkError;
use crate::liveness::LivenessChecker;

/// Sentinel meaning "don't attempt to decode the map module's output type at
/// all" (spec §9). Chosen to not collide with any realistic `type_url`.
pub const IGNORE_OUTPUT_MODULE_TYPE: &str = "__ignore_output_module_type__";
/// Sentinel meaning "resolve the output module type from the package itself"
/// (spec §9).
pub const INFER_OUTPUT_MODULE_FROM_PACKAGE: &str = "__infer_output_module_from_package__";

/// Where the RPC endpoint lives and how to reach it.
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    pub url: String,
    pub plaintext: bool,
    pub insecure: bool,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        EndpointConfig { url: url.into(), plaintext: false, insecure: false }
    }

    pub fn plaintext(mut self, plaintext: bool) -> Self {
        self.plaintext = plaintext;
        self
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }
}

/// Connection-level configuration: endpoint plus raw extra headers appended
/// to every RPC (spec §6 `WithExtraHeaders`).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub endpoint: EndpointConfig,
    pub authenticator: Authenticator,
    pub extra_headers: Vec<(String, String)>,
}

impl ClientConfig {
    pub fn new(endpoint: EndpointConfig) -> Self {
        ClientConfig {
            endpoint,
            authenticator: Authenticator::default_names(),
            extra_headers: Vec::new(),
        }
    }

    pub fn with_authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Parses and appends `"key: value"` header strings. Per spec §9's
    /// explicit recommendation, a malformed header is a construction error,
    /// not a process abort (the older `parseHeaders` helper in the source
    /// repo called `os.Exit`).
    pub fn with_extra_headers(mut self, headers: &[&str]) -> Result<Self, SinkError> {
        for raw in headers {
            let (key, value) = raw
                .split_once(':')
                .ok_or_else(|| SinkError::InvalidHeader((*raw).to_string()))?;
            self.extra_headers.push((key.trim().to_string(), value.trim().to_string()));
        }
        Ok(self)
    }
}

/// Builder-style accumulation of the `With*` options from spec §6. Applied
/// on top of [`crate::sinker::Sinker::new`]'s mandatory arguments.
pub struct SinkerOptions {
    pub block_range: BlockRange,
    pub block_data_buffer: u64,
    pub final_blocks_only: bool,
    pub infinite_retry: bool,
    pub backoff: Option<ExponentialBackoff>,
    pub liveness_checker: Option<Box<dyn LivenessChecker>>,
}

impl Default for SinkerOptions {
    fn default() -> Self {
        SinkerOptions {
            block_range: BlockRange::infinite_from(0),
            block_data_buffer: 0,
            final_blocks_only: false,
            infinite_retry: false,
            backoff: None,
            liveness_checker: None,
        }
    }
}

impl SinkerOptions {
    pub fn with_block_range(mut self, range: BlockRange) -> Self {
        self.block_range = range;
        self
    }

    /// `n == 0` disables buffering (spec §6).
    pub fn with_block_data_buffer(mut self, n: u64) -> Self {
        self.block_data_buffer = n;
        self
    }

    /// Implies and overrides the buffer to disabled (spec §6).
    pub fn with_final_blocks_only(mut self) -> Self {
        self.final_blocks_only = true;
        self.block_data_buffer = 0;
        self
    }

    pub fn with_infinite_retry(mut self) -> Self {
        self.infinite_retry = true;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn with_liveness_checker(mut self, checker: Box<dyn LivenessChecker>) -> Self {
        self.liveness_checker = Some(checker);
        self
    }

    /// Stats ticker interval: 15s at info level, 5s at debug (spec §4.G
    /// "Run loop" step 2). Exposed so the demo binary / tests don't have to
    /// special-case the duration.
    pub fn stats_interval(verbose: bool) -> Duration {
        if verbose {
            Duration::from_secs(5)
        } else {
            Duration::from_secs(15)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_blocks_only_disables_buffer() {
        let opts = SinkerOptions::default().with_block_data_buffer(10).with_final_blocks_only();
        assert!(opts.final_blocks_only);
        assert_eq!(opts.block_data_buffer, 0);
    }

    #[test]
    fn extra_headers_parse_key_value() {
        let cfg = ClientConfig::new(EndpointConfig::new("https://example.com"))
            .with_extra_headers(&["x-trace: abc123", "x-env:prod"])
            .unwrap();
        assert_eq!(cfg.extra_headers[0], ("x-trace".to_string(), "abc123".to_string()));
        assert_eq!(cfg.extra_headers[1], ("x-env".to_string(), "prod".to_string()));
    }

    #[test]
    fn malformed_header_is_a_construction_error() {
        let err = ClientConfig::new(EndpointConfig::new("https://example.com"))
            .with_extra_headers(&["not-a-header"])
            .unwrap_err();
        assert!(matches!(err, SinkError::InvalidHeader(_)));
    }
}
