use serde::Serialize;

use crate::models::Message;

pub fn greeting(model_name: &str) -> String {
    format!(
        "Hi! I'm powered by {}. How can I help you today?",
        model_name
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    AwaitingResponse,
}

/**
 * \brief 已提交、等待回复的一次发送；`epoch` 标识所属会话轮次。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub epoch: u64,
    pub content: String,
}

/**
 * \brief 预览挂件状态机：{closed, open} × {idle, awaiting-response}。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewWidget {
    open: bool,
    phase: Phase,
    messages: Vec<Message>,
    #[serde(skip)]
    epoch: u64,
}

impl PreviewWidget {
    pub fn new(model_name: &str) -> Self {
        PreviewWidget {
            open: false,
            phase: Phase::Idle,
            messages: vec![Message::assistant(greeting(model_name))],
            epoch: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /**
     * \brief 切换面板开合，返回切换后的状态。
     */
    pub fn toggle(&mut self) -> bool {
        self.open = !self.open;
        self.open
    }

    /**
     * \brief 换模型后重置：仅保留一条问候语并强制关闭，未完成的请求作废。
     */
    pub fn reset(&mut self, model_name: &str) {
        self.epoch += 1;
        self.open = false;
        self.phase = Phase::Idle;
        self.messages = vec![Message::assistant(greeting(model_name))];
    }

    /**
     * \brief 提交输入。空白输入或已有请求在途时不做任何事。
     */
    pub fn submit(&mut self, input: &str) -> Option<PendingSend> {
        let content = input.trim();
        if content.is_empty() || self.phase != Phase::Idle {
            return None;
        }
        self.messages.push(Message::user(content));
        self.phase = Phase::AwaitingResponse;
        Some(PendingSend {
            epoch: self.epoch,
            content: content.to_string(),
        })
    }

    /**
     * \brief 写入回复并回到 idle；若期间已重置则丢弃，返回是否采纳。
     */
    pub fn complete(&mut self, pending: &PendingSend, reply: impl Into<String>) -> bool {
        if pending.epoch != self.epoch || self.phase != Phase::AwaitingResponse {
            return false;
        }
        self.messages.push(Message::assistant(reply));
        self.phase = Phase::Idle;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_starts_closed_with_greeting() {
        let w = PreviewWidget::new("Demo");
        assert!(!w.is_open());
        assert_eq!(w.phase(), Phase::Idle);
        assert_eq!(w.messages().len(), 1);
        assert_eq!(w.messages()[0].role, Role::Assistant);
        assert!(w.messages()[0].content.contains("Demo"));
    }

    #[test]
    fn test_toggle_flips_open_state() {
        let mut w = PreviewWidget::new("Demo");
        assert!(w.toggle());
        assert!(!w.toggle());
    }

    #[test]
    fn test_submit_then_complete() {
        let mut w = PreviewWidget::new("Demo");
        let pending = w.submit("  hello  ").expect("accepted");
        assert_eq!(pending.content, "hello");
        assert_eq!(w.phase(), Phase::AwaitingResponse);
        assert_eq!(w.messages().last(), Some(&Message::user("hello")));

        assert!(w.complete(&pending, "hi"));
        assert_eq!(w.phase(), Phase::Idle);
        assert_eq!(w.messages().len(), 3);
        assert_eq!(w.messages()[2], Message::assistant("hi"));

        assert!(!w.complete(&pending, "again"));
        assert_eq!(w.messages().len(), 3);
    }

    #[test]
    fn test_blank_input_is_noop() {
        let mut w = PreviewWidget::new("Demo");
        let before = w.clone();
        assert!(w.submit("").is_none());
        assert!(w.submit(" \n\t ").is_none());
        assert_eq!(w, before);
    }

    #[test]
    fn test_submit_rejected_while_awaiting() {
        let mut w = PreviewWidget::new("Demo");
        let _pending = w.submit("one").expect("first");
        assert!(w.submit("two").is_none());
        assert_eq!(w.messages().len(), 2);
    }

    #[test]
    fn test_reset_closes_and_drops_stale_reply() {
        let mut w = PreviewWidget::new("Demo");
        w.toggle();
        let pending = w.submit("hello").expect("accepted");

        w.reset("Other");
        assert!(!w.is_open());
        assert_eq!(w.phase(), Phase::Idle);
        assert_eq!(w.messages(), &[Message::assistant(greeting("Other"))]);

        assert!(!w.complete(&pending, "late reply"));
        assert_eq!(w.messages().len(), 1);
    }
}
