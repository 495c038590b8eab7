// BLOB version prefix helpers. [version: u8][payload].
// metrics: version 1 = wincode Vec<MetricValue>.

pub(super) const METRICS_BLOB_VERSION: u8 = 1;

pub(super) fn with_version_prefix(version: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(version);
    out.extend_from_slice(&payload);
    out
}

/// Payload after the version byte, or None for an unknown version.
pub(super) fn blob_payload(bytes: &[u8], expected_version: u8) -> Option<&[u8]> {
    match bytes.split_first() {
        Some((&version, payload)) if version == expected_version => Some(payload),
        _ => None,
    }
}
