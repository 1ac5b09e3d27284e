/// Format a context packet section with machine-inspectable delimiters.
pub fn format_packet_section(
    name: &str,
    content: &str,
    raw_chars: usize,
    truncated_per_file: bool,
    truncated_total_cap: bool,
) -> String {
    let injected_chars = content.len();
    format!(
        "\
=== CONTEXT_PACKET: {name} ===
RAW_CHARS: {raw_chars}
INJECTED_CHARS: {injected_chars}
TRUNCATED_PER_FILE: {truncated_per_file}
TRUNCATED_TOTAL_CAP: {truncated_total_cap}
--- BEGIN ---
{content}
--- END ---
"
    )
}

/// Format a missing-packet marker (a node was expected to contribute but
/// produced nothing, e.g. it failed and fell back to an empty artifact).
pub fn format_missing_marker(name: &str) -> String {
    format!(
        "\
=== CONTEXT_PACKET: {name} ===
MISSING: true
--- BEGIN ---
[NO CONTENT PRODUCED]
--- END ---
"
    )
}
