use std::cmp::Ordering;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub(crate) fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Timestamp stored in `updatedAt`.
pub(crate) fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| now_ms().to_string())
}

pub(crate) fn random_u32() -> u32 {
    let mut buf = [0u8; 4];
    match getrandom::getrandom(&mut buf) {
        Ok(()) => u32::from_le_bytes(buf),
        // Uniqueness is re-checked by the caller; the clock alone is enough to make progress.
        Err(_) => (now_ms() as u32).rotate_left(13),
    }
}

/// Compare two display names the way the sidebar sorts them.
///
/// In the browser this defers to `String.prototype.localeCompare`; elsewhere it
/// falls back to a case-folded comparison with the raw strings as tie-break.
pub(crate) fn locale_cmp(a: &str, b: &str) -> Ordering {
    #[cfg(target_arch = "wasm32")]
    {
        let ord = js_sys::JsString::from(a).locale_compare(
            b,
            &js_sys::Array::new(),
            &js_sys::Object::new(),
        );
        ord.cmp(&0)
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    }
}

pub(crate) fn copy_name(name: &str, suffix: &str) -> String {
    format!("{name}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_cmp_ignores_case_first() {
        assert_eq!(locale_cmp("apple", "Banana"), Ordering::Less);
        assert_eq!(locale_cmp("Zebra Map", "Apple Map"), Ordering::Greater);
        assert_eq!(locale_cmp("same", "same"), Ordering::Equal);
    }

    #[test]
    fn test_copy_name_appends_suffix() {
        assert_eq!(copy_name("X", "のコピー"), "Xのコピー");
    }

    #[test]
    fn test_now_timestamp_is_rfc3339() {
        let ts = now_timestamp();
        assert!(OffsetDateTime::parse(&ts, &Rfc3339).is_ok());
    }
}
