use scraper::Html;

/// Marker that identifies the text node carrying the device JSON document.
pub const PAYLOAD_MARKER: &str = "REDYMETER";

/// Return the first text node of `html` that contains [`PAYLOAD_MARKER`].
///
/// Character references are already decoded in the returned text. A body
/// that is bare JSON (no markup at all) is handled the same way, since the
/// parser wraps loose text into a document body.
pub fn embedded_payload(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .find(|text| text.contains(PAYLOAD_MARKER))
        .map(str::to_owned)
}
