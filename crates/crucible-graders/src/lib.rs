use std::sync::Arc;

use crucible_core::grader_api::Grader;

pub mod captcha;
pub mod extraction;
pub mod watermark;

/// Static pack-id → grader table. Resolved once at startup; an unknown
/// pack id is rejected before any model call.
pub fn for_pack(pack_id: &str) -> Option<Arc<dyn Grader>> {
    match pack_id {
        watermark::PACK_ID => Some(Arc::new(watermark::WatermarkGrader)),
        extraction::PACK_ID => Some(Arc::new(extraction::ExtractionGrader)),
        captcha::PACK_ID => Some(Arc::new(captcha::ReverseCaptchaGrader)),
        _ => None,
    }
}

pub fn known_packs() -> [&'static str; 3] {
    [watermark::PACK_ID, extraction::PACK_ID, captcha::PACK_ID]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_every_known_pack() {
        for pack in known_packs() {
            let grader = for_pack(pack).expect(pack);
            assert_eq!(grader.pack_id(), pack);
        }
        assert!(for_pack("no_such_pack").is_none());
    }
}
