use crate::pipeline::rules::RuleSpec;

/// Base instruction for file classification. Always present in the system prompt.
pub const CLASSIFICATION_SYSTEM_PROMPT: &str = r#"You are a professional file classification assistant. Your task is to analyze file names and content and extract structured information.

You must ALWAYS return a valid JSON object with the following fields:
- category: The category/type of the file (e.g., "Work", "Personal", "Study", "Finance", etc.)
- year: The year associated with the file (4-digit format, e.g., "2024")
- month: The month associated with the file (2-digit format, e.g., "01", "12")
- summary: A brief summary or description of the file content
- original_name: The original file name without extension

Rules:
1. If you cannot determine a field, use "Unknown" as the value.
2. For year: Try to extract from the file name or content, if not found, use the current year.
3. For month: Try to extract from the file name or content, if not found, use "Unknown".
4. For category: Infer from file name and context. Common categories: Work, Personal, Study, Finance, Photos, Documents, Contract, Report, Invoice, Manual, etc.
5. For Chinese file names, understand the context and extract information accordingly.
   - 工作/会议/报告 → Work
   - 财务/发票/账单 → Finance
   - 合同/协议 → Contract
   - 个人/私人 → Personal
   - 学习/课程 → Study
6. Always return valid JSON format.
7. Field names must be in lowercase English.

Example 1 (Chinese file):
Input: "2024年度财务报告_Q1.pdf"
Output:
{
    "category": "Finance",
    "year": "2024",
    "month": "Unknown",
    "summary": "Q1 Financial Report",
    "original_name": "2024年度财务报告_Q1"
}

Example 2 (English file):
Input: "meeting_notes_2023_12_15.docx"
Output:
{
    "category": "Work",
    "year": "2023",
    "month": "12",
    "summary": "Meeting notes from December 15",
    "original_name": "meeting_notes_2023_12_15"
}
"#;

/// Base prompt plus one enumerated-choice constraint per rule that has options.
pub fn build_dynamic_prompt(rules: &[RuleSpec]) -> String {
    let constraints: Vec<String> = rules
        .iter()
        .filter_map(|rule| {
            let options = rule.options.as_deref().filter(|o| !o.is_empty())?;
            Some(field_constraint(&rule.key, options))
        })
        .collect();

    if constraints.is_empty() {
        return CLASSIFICATION_SYSTEM_PROMPT.to_string();
    }
    format!("{CLASSIFICATION_SYSTEM_PROMPT}\n{}", constraints.join("\n"))
}

fn field_constraint(key: &str, options: &[String]) -> String {
    format!(
        "\n\nIMPORTANT CONSTRAINT for field '{key}':\n\
         The value of '{key}' MUST be exactly one of: {}\n\
         If you are unsure, choose the closest match from these options. Do not use any other value.\n\
         This is a classification task (multiple choice), not open-ended generation.",
        options.join(", ")
    )
}

/// User message for one file: its name and a content excerpt.
pub fn build_classification_prompt(file_name: &str, excerpt: &str) -> String {
    let excerpt = excerpt.trim();
    if excerpt.is_empty() {
        return format!("Classify this file.\n\nFile name: \"{file_name}\"");
    }
    format!(
        "Classify this file.\n\nFile name: \"{file_name}\"\n\n\
         <content>\n{excerpt}\n</content>"
    )
}
