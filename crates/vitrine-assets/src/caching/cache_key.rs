use std::fmt;
use std::sync::Arc;

/// How a texture wraps outside the `[0, 1]` UV range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    #[default]
    Clamp,
    Repeat,
}

impl WrapMode {
    fn as_str(&self) -> &'static str {
        match self {
            WrapMode::Clamp => "clamp",
            WrapMode::Repeat => "repeat",
        }
    }
}

/// Decode options that affect the decoded result and therefore contribute to
/// asset identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DecodeOptions {
    pub wrap: WrapMode,
    pub generate_mips: bool,
}

/// Normalized identity of a requested asset: its source location plus the
/// decode options that shape the result.
///
/// Keys are value-equal, and two logically identical requests always
/// normalize to the same key. Construction goes through [`AssetKey::new`],
/// which canonicalizes the source string, so equal-looking requests cannot
/// end up as distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    source: Arc<str>,
    options: DecodeOptions,
}

impl AssetKey {
    /// Creates a key from a source location (local path or URL) and decode
    /// options.
    ///
    /// The source is normalized: surrounding whitespace is trimmed and
    /// Windows-style path separators are folded to `/`.
    pub fn new(source: &str, options: DecodeOptions) -> Self {
        let trimmed = source.trim();
        let source: Arc<str> = if trimmed.contains('\\') {
            trimmed.replace('\\', "/").into()
        } else {
            trimmed.into()
        };
        Self { source, options }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}?wrap={}&mips={}",
            self.source,
            self.options.wrap.as_str(),
            self.options.generate_mips
        )
    }
}
