/// Stands in for the context block when retrieval found nothing, so the model
/// is told explicitly that it has no grounding.
pub const NO_CONTEXT_MARKER: &str =
    "NO_CONTEXT_FOUND: none of the indexed documents matched this question.";

pub const EVIDENCE_SEPARATOR: &str = "\n\n---\n\n";

pub fn source_tag(document_id: &str, position: u32) -> String {
    format!("[source: {document_id} #{position}]")
}

pub fn evidence_block(document_id: &str, position: u32, text: &str) -> String {
    format!("{}\n{}", source_tag(document_id, position), text)
}

pub fn user_turn(context_block: &str, user_query: &str) -> String {
    format!("Context:\n{context_block}\n\nQuestion: {user_query}")
}

pub fn render(system_prompt: &str, context_block: &str, user_query: &str) -> String {
    format!(
        "{}\n\n{}\n\nAnswer:",
        system_prompt.trim_end(),
        user_turn(context_block, user_query)
    )
}
