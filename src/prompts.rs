//! Fixed prompts sent with every batch request.
//!
//! Both texts are part of the extraction policy and are not configurable:
//! every batch of a run, and every run, sees exactly the same instructions so
//! outputs stay comparable across documents. The wording is the one the
//! Doubao vision models are tuned against, so it is kept in Chinese.

/// System message placed first in every request.
///
/// "You are the Doubao AI assistant, good at parsing documents as the user
/// asks."
pub const SYSTEM_PROMPT: &str = "你是豆包AI助手，善于按用户的要求解析文档";

/// Instruction text placed before the images in the user message.
///
/// The images of a batch are attached in page order right after this text.
/// It asks for all text in image order with the page structure kept
/// (Markdown or HTML allowed), then lists four rules: accurate paragraphs,
/// skip blank images, render merged-cell tables properly, omit page numbers.
pub const EXTRACTION_INSTRUCTION: &str = "请严格按输入图片的顺序提取出图片中的所有文字内容，\
并根据原图中各项内容的结构尽量保持输出类似的结构，可以使用Markdown、html等标签来体现结构\n\
1. 注意段落的准确性\n\
2. 遇到空白的图片就继续解析下一张图片\n\
3. 文档中可能存在合并单元格的表格，要正确解析并用Markdown或html恰当表示\n\
4. 不提取页码\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_lists_all_rules() {
        let lines: Vec<&str> = EXTRACTION_INSTRUCTION.lines().collect();
        assert_eq!(lines.len(), 5);
        for (i, rule) in lines[1..].iter().enumerate() {
            assert!(rule.starts_with(&format!("{}. ", i + 1)), "rule {rule}");
        }
        assert_eq!(lines[4], "4. 不提取页码");
    }

    #[test]
    fn instruction_keeps_image_order_requirement() {
        assert!(EXTRACTION_INSTRUCTION.starts_with("请严格按输入图片的顺序"));
        assert!(SYSTEM_PROMPT.contains("解析文档"));
    }
}
