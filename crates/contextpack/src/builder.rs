use crate::injection;
use crate::report::{ContextReport, FileReport};
use crate::truncation::{self, Section};
use agentrt_domain::blackboard::ContextPacket;

/// Estimate token count for a chunk of text. Rough heuristic (4 chars/token,
/// same convention the teacher's prompt-budgeting code uses), not a real
/// tokenizer -- good enough for the truncation bookkeeping this crate owns.
pub fn estimate_tokens(content: &str) -> u32 {
    ((content.len() as f64) / 4.0).ceil() as u32
}

/// Build a single node's [`ContextPacket`] from its raw output, applying the
/// per-packet truncation cap and stamping a token estimate.
pub fn build_packet(name: &str, raw_content: &str, max_chars: usize) -> (ContextPacket, bool) {
    let normalized = raw_content.replace("\r\n", "\n");
    let (content, was_truncated) = truncation::truncate_per_file(&normalized, max_chars);
    let token_estimate = estimate_tokens(&content);
    (
        ContextPacket { name: name.to_string(), content, json: None, binary: None, token_estimate },
        was_truncated,
    )
}

/// Deterministic context pack assembler.
///
/// Pure function: accepts already-produced context packets (one per graph
/// node that contributed) plus the ordered list of node names expected to
/// contribute, and returns the assembled prompt text plus a machine-readable
/// report. Nodes with no matching packet are rendered as a missing marker
/// rather than causing a failure.
pub struct ContextPackBuilder {
    pub max_per_file: usize,
    pub total_max: usize,
}

impl ContextPackBuilder {
    pub fn new(max_per_file: usize, total_max: usize) -> Self {
        Self { max_per_file, total_max }
    }

    /// Assemble the final context text from the packets contributed by a
    /// turn's context graph execution, in the given node order.
    pub fn build(&self, node_order: &[String], packets: &[ContextPacket]) -> (String, ContextReport) {
        let mut sections: Vec<Section> = Vec::new();

        for name in node_order {
            let packet = packets.iter().find(|p| &p.name == name);

            match packet {
                Some(p) => {
                    let raw_chars = p.content.len();
                    let (truncated_content, was_truncated) =
                        truncation::truncate_per_file(&p.content, self.max_per_file);

                    sections.push(Section {
                        filename: name.clone(),
                        content: truncated_content,
                        raw_chars,
                        truncated_per_file: was_truncated,
                        truncated_total_cap: false,
                        included: true,
                        missing: false,
                    });
                }
                None => {
                    sections.push(Section {
                        filename: name.clone(),
                        content: String::new(),
                        raw_chars: 0,
                        truncated_per_file: false,
                        truncated_total_cap: false,
                        included: true,
                        missing: true,
                    });
                }
            }
        }

        truncation::apply_total_cap(&mut sections, self.total_max);

        let mut assembled = String::new();
        let mut file_reports: Vec<FileReport> = Vec::new();

        for section in &sections {
            file_reports.push(FileReport {
                name: section.filename.clone(),
                raw_chars: section.raw_chars,
                injected_chars: if section.included && !section.missing { section.content.len() } else { 0 },
                truncated_per_file: section.truncated_per_file,
                truncated_total_cap: section.truncated_total_cap,
                included: section.included,
                missing: section.missing,
            });

            if section.missing && section.included {
                assembled.push_str(&injection::format_missing_marker(&section.filename));
                assembled.push('\n');
            } else if section.included && !section.content.is_empty() {
                assembled.push_str(&injection::format_packet_section(
                    &section.filename,
                    &section.content,
                    section.raw_chars,
                    section.truncated_per_file,
                    section.truncated_total_cap,
                ));
                assembled.push('\n');
            }
        }

        let total_injected_chars = assembled.len();
        let report = ContextReport {
            files: file_reports,
            total_injected_chars,
            total_token_estimate: estimate_tokens(&assembled),
        };

        (assembled, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(name: &str, content: &str) -> ContextPacket {
        ContextPacket {
            name: name.to_string(),
            content: content.to_string(),
            json: None,
            binary: None,
            token_estimate: estimate_tokens(content),
        }
    }

    #[test]
    fn assembles_packets_in_node_order() {
        let builder = ContextPackBuilder::new(1000, 10_000);
        let packets = vec![packet("search", "search results"), packet("docs", "doc excerpt")];
        let order = vec!["docs".to_string(), "search".to_string()];

        let (assembled, report) = builder.build(&order, &packets);
        let docs_pos = assembled.find("doc excerpt").unwrap();
        let search_pos = assembled.find("search results").unwrap();
        assert!(docs_pos < search_pos);
        assert_eq!(report.files.len(), 2);
    }

    #[test]
    fn missing_node_renders_marker_not_failure() {
        let builder = ContextPackBuilder::new(1000, 10_000);
        let order = vec!["missing-node".to_string()];

        let (assembled, report) = builder.build(&order, &[]);
        assert!(assembled.contains("NO CONTENT PRODUCED"));
        assert!(report.files[0].missing);
    }

    #[test]
    fn build_packet_truncates_and_estimates_tokens() {
        let (packet, truncated) = build_packet("big", &"x".repeat(100), 10);
        assert!(truncated);
        assert!(packet.content.contains("[TRUNCATED]"));
        assert!(packet.token_estimate > 0);
    }
}
