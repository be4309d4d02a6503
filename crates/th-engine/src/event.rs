/// A normalized inbound webhook event, reduced to the fields the engine
/// acts on. The daemon builds one per `issue_comment.created` delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Login of the commenting user.
    pub user: String,
    /// Raw comment body.
    pub comment: String,
    /// Number of the issue the comment landed on.
    pub issue_number: Option<u64>,
    /// Title of that issue, used by the `test` command to pick a
    /// grading script.
    pub issue_title: Option<String>,
}

impl InboundEvent {
    pub fn new(user: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            comment: comment.into(),
            issue_number: None,
            issue_title: None,
        }
    }

    pub fn with_issue(mut self, number: u64, title: impl Into<String>) -> Self {
        self.issue_number = Some(number);
        self.issue_title = Some(title.into());
        self
    }
}
