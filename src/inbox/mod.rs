/// 未读邮件轮询
///
/// 一次列表查询 + 每封邮件一次详情查询，按列表顺序生成摘要
use std::io::Write;

use crate::mail::gmail::api::MailApi;
use crate::mail::gmail::error::ApiError;
use crate::mail::gmail::types::MessageSummary;

/// 列出未读邮件摘要
///
/// 任意一封邮件获取失败都会中止整批查询
///
/// # Errors
/// - 列表查询失败
/// - 某封邮件详情获取失败（错误中带有邮件 ID）
pub async fn list_unread<M: MailApi>(api: &M) -> Result<Vec<MessageSummary>, ApiError> {
    let ids = api.list_unread().await?;

    let mut summaries = Vec::with_capacity(ids.len());
    for id in ids {
        let preview = match api.get_preview(&id).await {
            Ok(preview) => preview,
            Err(e) => {
                tracing::error!("❌ 获取邮件 {} 失败: {}", id, e);
                return Err(ApiError::Message {
                    id,
                    source: Box::new(e),
                });
            }
        };
        summaries.push(MessageSummary { id, preview });
    }

    tracing::info!("📬 共 {} 封未读邮件", summaries.len());
    Ok(summaries)
}

/// 输出摘要
pub fn render(summaries: &[MessageSummary], out: &mut impl Write) -> std::io::Result<()> {
    if summaries.is_empty() {
        writeln!(out, "No new messages.")?;
        return Ok(());
    }

    writeln!(out, "New messages received:")?;
    for summary in summaries {
        writeln!(out, "Message snippet: {}", summary.preview)?;
    }
    Ok(())
}
