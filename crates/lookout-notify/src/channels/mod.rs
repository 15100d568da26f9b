pub mod dingtalk;
pub mod email;
pub mod feishu;
pub mod wechat;

pub use dingtalk::DingTalkNotifier;
pub use email::EmailNotifier;
pub use feishu::FeishuNotifier;
pub use wechat::WeChatNotifier;
