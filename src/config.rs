use crate::registry::TagRegistry;
use serde::{Deserialize, Serialize};

/// Maximum list nesting the parser will follow before treating the list as opaque.
pub const MAX_DEPTH: usize = 64;
/// Maximum size of a single inflated stream, 256 MiB.
pub const MAX_INFLATED_SIZE: usize = 1usize << 28;
/// Default minimum progress step between observer events.
pub const PROGRESS_STEP: f32 = 0.03;

/// Settings for a parse.
///
/// Can be loaded from any serde format; fields left out take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ParseOptions {
    /// Class map for specialized chunks.
    pub registry: TagRegistry,
    /// Abort the whole parse when a compressed region fails to inflate, instead of keeping it as
    /// undecoded bytes.
    pub strict_compression: bool,
    /// Nesting limit for lists.
    pub max_depth: usize,
    /// Upper bound on the output of any one inflate.
    pub max_inflated_size: usize,
    /// Minimum fraction of the input between progress events.
    pub progress_step: f32,
}

impl ParseOptions {
    pub fn with_registry(registry: TagRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            registry: TagRegistry::new(),
            strict_compression: false,
            max_depth: MAX_DEPTH,
            max_inflated_size: MAX_INFLATED_SIZE,
            progress_step: PROGRESS_STEP,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_config_takes_defaults() {
        let opts: ParseOptions = serde_json::from_str(r#"{ "strict_compression": true }"#).unwrap();
        assert!(opts.strict_compression);
        assert_eq!(opts.max_depth, MAX_DEPTH);
        assert!(opts.registry.is_empty());
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(serde_json::from_str::<ParseOptions>(r#"{ "strict": true }"#).is_err());
    }
}
