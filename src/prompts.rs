//! Prompt text for schema-driven invoice extraction.
//!
//! Only the schema shape varies between requests; the instruction text around
//! it is fixed here so prompt regressions show up in unit tests without a
//! model.

/// System message sent with every extraction request.
pub const SYSTEM_INSTRUCTION: &str = "Respond only in raw JSON. No extra text or explanations.";

/// Opening of the user prompt, before the shape block.
const PROMPT_HEADER: &str = "You are an invoice data extraction assistant. Analyze the provided invoice image(s) and extract the following information into a JSON object.

Respond ONLY with valid JSON. No explanations, no markdown code fences, no additional text.

Required JSON structure:";

/// Rules appended after the shape block.
const PROMPT_RULES: &str = "Rules:
- If a field value is not found in the invoice, use null.
- For number fields, return numeric values without currency symbols.
- For date fields, use ISO 8601 format (YYYY-MM-DD).
- For array fields, include every row/line item visible in the invoice.
- If the invoice spans multiple pages, combine data from all pages into a single JSON object.";

/// Wrap a compiled JSON shape block into the full user prompt.
pub fn extraction_prompt(shape: &str) -> String {
    format!("{PROMPT_HEADER}\n{shape}\n\n{PROMPT_RULES}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_shape_between_header_and_rules() {
        let prompt = extraction_prompt("{\n  \"total\": number,\n}");
        let shape_at = prompt.find("\"total\": number").unwrap();
        assert!(prompt.find("Required JSON structure:").unwrap() < shape_at);
        assert!(prompt.find("Rules:").unwrap() > shape_at);
    }

    #[test]
    fn system_instruction_demands_json() {
        assert!(SYSTEM_INSTRUCTION.contains("raw JSON"));
    }
}
