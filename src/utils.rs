use crate::constants::MSISDN_PATTERN;

pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}

/// Canonical Kenyan MSISDN rule. Accepts `07XXXXXXXX`, `01XXXXXXXX`,
/// `2547XXXXXXXX` and `+2547XXXXXXXX`, returns the normalized
/// `254XXXXXXXXX` form. Every phone-accepting surface goes through this
/// single function.
pub fn normalize_msisdn(raw: &str) -> Option<String> {
    let trimmed: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    MSISDN_PATTERN
        .captures(&trimmed)
        .map(|captures| format!("254{}", &captures[1]))
}

pub fn mask_msisdn(msisdn: &str) -> String {
    if msisdn.len() < 6 {
        return "*".repeat(msisdn.len());
    }
    format!(
        "{}{}{}",
        &msisdn[..3],
        "*".repeat(msisdn.len() - 6),
        &msisdn[msisdn.len() - 3..]
    )
}
