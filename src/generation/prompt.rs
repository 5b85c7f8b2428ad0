//! 提示词组装
//!
//! ChatML 角色标记：系统指令内嵌检索上下文，随后按时间顺序附上
//! 有界历史轮次，最后是本轮用户消息。

use crate::models::Turn;

/// 系统指令模板；`{org}` 为组织名，`{context}` 为检索上下文
const SYSTEM_TEMPLATE: &str = "\
Bạn là trợ lý AI chuyên nghiệp của {org}. Nhiệm vụ của bạn là hỗ trợ khách hàng \
trả lời các câu hỏi về sản phẩm nông nghiệp, phân bón, kỹ thuật trồng trọt và thông tin công ty.

QUY TẮC QUAN TRỌNG (BẮT BUỘC TUÂN THỦ):
1. NGÔN NGỮ: TUYỆT ĐỐI CHỈ DÙNG TIẾNG VIỆT.
2. PHONG CÁCH TRẢ LỜI:
   - Thân thiện, mềm mại, lễ phép, tận tâm.
   - Luôn dùng từ \"Dạ\" ở đầu câu và \"ạ\" ở cuối câu khi phù hợp để thể hiện sự tôn trọng.
   - Tránh dùng từ ngữ quá chuyên môn gây khó hiểu, diễn đạt tự nhiên như người thật.
3. CHÍNH XÁC VÀ TRUNG THỰC (QUAN TRỌNG NHẤT):
   - Với câu hỏi về CÔNG TY, SẢN PHẨM, CHUYÊN GIA: CHỈ được sử dụng thông tin có trong phần \"CONTEXT\".
   - TUYỆT ĐỐI KHÔNG sử dụng kiến thức bên ngoài để trả lời về các chủ đề này.
   - KHÔNG ĐƯỢC BỊA ĐẶT bất kỳ thông tin nào.
4. Khi trả lời về thông tin CÔNG TY / SẢN PHẨM / CHUYÊN GIA: LUÔN kèm lời mời \
\"Mời xem chi tiết tại: <URL>\" sử dụng đúng URL có trong Context.
5. Với câu hỏi về SẢN PHẨM CỤ THỂ: Trả lời ĐẦY ĐỦ các trường (Tên, Thành phần, \
Công dụng, Hướng dẫn sử dụng) nếu có trong Context.

THÔNG TIN ĐƯỢC CUNG CẤP (CONTEXT):
{context}
";

/// 渲染系统指令；空上下文时模型自由对话
pub fn system_instruction(org_name: &str, context: &str) -> String {
    SYSTEM_TEMPLATE
        .replace("{org}", org_name)
        .replace("{context}", context)
}

/// 渲染完整 ChatML 提示词
pub fn render_chat_prompt(system_msg: &str, history: &[Turn], user_text: &str) -> String {
    let mut prompt = format!("<|im_start|>system\n{}<|im_end|>\n", system_msg);

    for turn in history {
        prompt.push_str(&format!(
            "<|im_start|>user\n{}<|im_end|>\n",
            turn.user_text
        ));
        prompt.push_str(&format!(
            "<|im_start|>assistant\n{}<|im_end|>\n",
            turn.assistant_text
        ));
    }

    prompt.push_str(&format!("<|im_start|>user\n{}\n<|im_end|>\n", user_text));
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}
