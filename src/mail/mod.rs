/// 邮件服务提供方
pub mod gmail;
