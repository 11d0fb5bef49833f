//! General-purpose conversion engines

/// Full-text Traditional to Simplified converter
pub trait ConversionEngine: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &'static str;

    /// Convert text; must not panic on any input
    fn convert(&self, text: &str) -> String;
}

/// Engine backed by the `zhconv` rule set (zh-Hans target)
#[cfg(feature = "zhconv")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ZhconvEngine;

#[cfg(feature = "zhconv")]
impl ConversionEngine for ZhconvEngine {
    fn name(&self) -> &'static str {
        "zhconv"
    }

    fn convert(&self, text: &str) -> String {
        zhconv::zhconv(text, zhconv::Variant::ZhHans)
    }
}

/// The engine compiled into this build, if any
pub fn default_engine() -> Option<Box<dyn ConversionEngine>> {
    #[cfg(feature = "zhconv")]
    {
        Some(Box::new(ZhconvEngine))
    }
    #[cfg(not(feature = "zhconv"))]
    {
        None
    }
}
