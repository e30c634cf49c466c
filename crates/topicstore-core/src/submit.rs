//! Optimistic write submitter
//!
//! The forum offers no write API to widgets, so a revision is written the
//! way a person would write it: open the topic page, fill the reply box,
//! press submit. All knowledge of the page markup stays in this module.
//!
//! Submission is fire-and-forget. Whether the reply landed is decided by
//! the poller, not here.

use crate::config::ForumConfig;
use crate::error::{Result, SubmitError};
use crate::revision::TopicId;
use async_trait::async_trait;
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use reqwest::Url;
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Something that can append a reply to a topic
#[async_trait]
pub trait ReplySubmitter: Send + Sync {
    /// Start writing `payload` as a new reply
    ///
    /// Returns as soon as the write is under way. The returned handle must
    /// be closed once the outcome is known.
    ///
    /// # Errors
    /// `StoreError::Submit` if the write cannot even be started.
    async fn submit(&self, topic: TopicId, payload: &str) -> Result<Submission>;
}

/// Handle on an in-flight reply
///
/// Owns the background work driving the reply surface. Closing (or
/// dropping) it aborts whatever has not run yet, so a retried save never
/// posts twice through the same handle.
#[derive(Debug)]
pub struct Submission {
    topic: TopicId,
    task: Option<JoinHandle<()>>,
}

impl Submission {
    /// Run `work` in the background for `topic`
    pub fn spawn<F>(topic: TopicId, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            topic,
            task: Some(tokio::spawn(work)),
        }
    }

    /// Handle for a write that completed inline
    #[must_use]
    pub fn completed(topic: TopicId) -> Self {
        Self { topic, task: None }
    }

    /// Topic being written
    #[inline]
    #[must_use]
    pub fn topic(&self) -> TopicId {
        self.topic
    }

    /// Whether the background work has finished
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Tear down the reply surface
    pub fn close(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                tracing::debug!(topic = %self.topic, "discarding unfinished reply submission");
            }
            task.abort();
        }
    }
}

impl Drop for Submission {
    fn drop(&mut self) {
        self.abort();
    }
}

/// A reply form ready to post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyForm {
    /// Where the form posts to
    pub action: Url,
    /// Field values in document order, reply text included
    pub fields: Vec<(String, String)>,
}

/// Collects every start and end tag of a page
struct TagSink {
    tags: RefCell<Vec<Tag>>,
}

impl TokenSink for TagSink {
    type Handle = ();

    fn process_token(&self, token: Token, _line: u64) -> TokenSinkResult<()> {
        let Token::TagToken(tag) = token else {
            return TokenSinkResult::Continue;
        };
        // Without a tree builder the tokenizer needs telling which
        // elements hold text rather than markup.
        let raw = match (&tag.kind, &*tag.name) {
            (TagKind::StartTag, "script") => Some(RawKind::ScriptData),
            (TagKind::StartTag, "style") => Some(RawKind::Rawtext),
            (TagKind::StartTag, "textarea" | "title") => Some(RawKind::Rcdata),
            _ => None,
        };
        let self_closing = tag.self_closing;
        self.tags.borrow_mut().push(tag);
        match raw {
            Some(kind) if !self_closing => TokenSinkResult::RawData(kind),
            _ => TokenSinkResult::Continue,
        }
    }
}

fn page_tags(html: &str) -> Vec<Tag> {
    let sink = TagSink {
        tags: RefCell::new(Vec::new()),
    };
    let tokenizer = Tokenizer::new(sink, TokenizerOpts::default());

    let input = BufferQueue::default();
    input.push_back(StrTendril::from(html));
    let _ = tokenizer.feed(&input);
    tokenizer.end();

    tokenizer.sink.tags.into_inner()
}

fn is_start(tag: &Tag, name: &str) -> bool {
    tag.kind == TagKind::StartTag && &*tag.name == name
}

fn has_id(tag: &Tag, id: &str) -> bool {
    attr(tag, "id").as_deref() == Some(id)
}

/// Attribute value, entities already decoded by the tokenizer
fn attr(tag: &Tag, name: &str) -> Option<String> {
    tag.attrs
        .iter()
        .find(|a| &*a.name.local == name)
        .map(|a| a.value.to_string())
}

/// Locate the reply form on a topic page and fill in `payload`
///
/// # Errors
/// `SubmitError::FormNotFound` if the form or its reply box is missing,
/// `SubmitError::InvalidUrl` if the form action cannot be resolved.
pub fn parse_reply_form(
    html: &str,
    page_url: &Url,
    config: &ForumConfig,
    payload: &str,
) -> std::result::Result<ReplyForm, SubmitError> {
    let tags = page_tags(html);
    let form_at = tags
        .iter()
        .position(|t| is_start(t, "form") && has_id(t, &config.form_id))
        .ok_or_else(|| SubmitError::FormNotFound(format!("form#{}", config.form_id)))?;
    let form = &tags[form_at];
    let body: Vec<&Tag> = tags[form_at + 1..]
        .iter()
        .take_while(|t| !(t.kind == TagKind::EndTag && &*t.name == "form"))
        .collect();

    let action = match attr(form, "action") {
        Some(a) if !a.is_empty() => page_url
            .join(&a)
            .map_err(|e| SubmitError::InvalidUrl(format!("{a}: {e}")))?,
        _ => page_url.clone(),
    };

    let reply_name = body
        .iter()
        .find(|t| is_start(t, "textarea") && has_id(t, &config.textarea_id))
        .map(|t| attr(t, "name").unwrap_or_else(|| config.textarea_name.clone()))
        .ok_or_else(|| SubmitError::FormNotFound(format!("textarea#{}", config.textarea_id)))?;

    let mut fields = Vec::new();
    let mut submit_value = None;
    for input in body.iter().filter(|t| is_start(t, "input")) {
        let Some(name) = attr(input, "name") else {
            continue;
        };
        let value = attr(input, "value").unwrap_or_default();
        if name == config.submit_name {
            submit_value = Some(value);
        } else if attr(input, "type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")) {
            fields.push((name, value));
        }
    }
    fields.push((reply_name, payload.to_string()));
    fields.push((
        config.submit_name.clone(),
        submit_value.unwrap_or_else(|| "Submit".to_string()),
    ));

    Ok(ReplyForm { action, fields })
}

/// [`ReplySubmitter`] that drives the forum's human reply form over HTTP
#[derive(Debug, Clone)]
pub struct ReplyFormSubmitter {
    client: reqwest::Client,
    config: Arc<ForumConfig>,
}

impl ReplyFormSubmitter {
    /// Create a submitter with its own cookie-carrying HTTP client
    ///
    /// # Errors
    /// `StoreError::Transport` if the HTTP client cannot be built.
    pub fn new(config: ForumConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create a submitter sharing an existing HTTP client (and its session)
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: ForumConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    fn page_url(&self, topic: TopicId) -> std::result::Result<Url, SubmitError> {
        let view = self.config.view_url();
        let mut url =
            Url::parse(&view).map_err(|e| SubmitError::InvalidUrl(format!("{view}: {e}")))?;
        url.query_pairs_mut().append_pair("id", &topic.to_string());
        Ok(url)
    }
}

async fn post_reply(
    client: &reqwest::Client,
    config: &ForumConfig,
    page_url: Url,
    payload: &str,
) -> std::result::Result<(), SubmitError> {
    let page = client
        .get(page_url.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| SubmitError::PageUnavailable(e.to_string()))?
        .text()
        .await
        .map_err(|e| SubmitError::PageUnavailable(e.to_string()))?;

    let form = parse_reply_form(&page, &page_url, config, payload)?;
    tracing::debug!(action = %form.action, fields = form.fields.len(), "posting reply form");

    client
        .post(form.action)
        .form(&form.fields)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| SubmitError::PageUnavailable(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl ReplySubmitter for ReplyFormSubmitter {
    async fn submit(&self, topic: TopicId, payload: &str) -> Result<Submission> {
        let page_url = self.page_url(topic)?;
        let client = self.client.clone();
        let config = Arc::clone(&self.config);
        let payload = payload.to_string();

        Ok(Submission::spawn(topic, async move {
            match post_reply(&client, &config, page_url, &payload).await {
                Ok(()) => tracing::debug!(%topic, "reply form submitted"),
                Err(e) => tracing::warn!(%topic, error = %e, "reply form submission failed"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use warp::Filter;

    const PAGE: &str = r#"
        <html><body>
        <form id="search" action="/search.php"><input name="q"></form>
        <form id="post" method="post" action="post.php?tid=5">
            <input type="hidden" name="form_sent" value="1">
            <input type="hidden" name="csrf_token" value="a&amp;b">
            <input type="text" name="subject" value="ignored">
            <textarea id="main-reply" name="req_message" rows="7"></textarea>
            <input type="submit" name="submit" value="Send">
        </form>
        </body></html>
    "#;

    fn page_url() -> Url {
        Url::parse("https://forum.example.org/viewtopic.php?id=5").unwrap()
    }

    #[test]
    fn parse_fills_reply_and_keeps_hidden_fields() {
        let form = parse_reply_form(PAGE, &page_url(), &ForumConfig::default(), "{\"a\":[1]}")
            .unwrap();

        assert_eq!(form.action.as_str(), "https://forum.example.org/post.php?tid=5");
        assert_eq!(
            form.fields,
            vec![
                ("form_sent".to_string(), "1".to_string()),
                ("csrf_token".to_string(), "a&b".to_string()),
                ("req_message".to_string(), "{\"a\":[1]}".to_string()),
                ("submit".to_string(), "Send".to_string()),
            ]
        );
    }

    #[test]
    fn parse_uses_fallback_name_for_unnamed_textarea() {
        let html = r#"<form id="post"><textarea id="main-reply"></textarea></form>"#;
        let form = parse_reply_form(html, &page_url(), &ForumConfig::default(), "x").unwrap();
        assert_eq!(form.action, page_url());
        assert!(form.fields.contains(&("req_message".to_string(), "x".to_string())));
        assert!(form.fields.contains(&("submit".to_string(), "Submit".to_string())));
    }

    #[test]
    fn parse_rejects_page_without_reply_form() {
        let html = r#"<form id="login"><input name="user"></form>"#;
        let err = parse_reply_form(html, &page_url(), &ForumConfig::default(), "x").unwrap_err();
        assert!(matches!(err, SubmitError::FormNotFound(_)));

        let html = r#"<form id="post"><textarea id="other"></textarea></form>"#;
        let err = parse_reply_form(html, &page_url(), &ForumConfig::default(), "x").unwrap_err();
        assert!(matches!(err, SubmitError::FormNotFound(_)));
    }

    #[test]
    fn parse_decodes_attribute_entities() {
        let html = r#"<form id="post">
            <input type="hidden" name="token" value="a&#x2F;b&#039;c&quot;d">
            <textarea id="main-reply" name="req_message"></textarea>
        </form>"#;
        let form = parse_reply_form(html, &page_url(), &ForumConfig::default(), "x").unwrap();
        assert_eq!(form.fields[0], ("token".to_string(), "a/b'c\"d".to_string()));
    }

    #[test]
    fn parse_handles_markup_inside_attribute_values() {
        let html = r#"<form data-x="a>b" id="post" action='/post.php?x=1&amp;y=2'>
            <textarea data-x="a>b" id="main-reply" name="req_message"><input type="hidden" name="fake" value="1"></textarea>
            <INPUT TYPE="HIDDEN" NAME="form_sent" VALUE=1>
        </form>"#;
        let form = parse_reply_form(html, &page_url(), &ForumConfig::default(), "x").unwrap();

        assert_eq!(form.action.as_str(), "https://forum.example.org/post.php?x=1&y=2");
        assert_eq!(
            form.fields,
            vec![
                ("form_sent".to_string(), "1".to_string()),
                ("req_message".to_string(), "x".to_string()),
                ("submit".to_string(), "Submit".to_string()),
            ]
        );
    }

    #[test]
    fn parse_ignores_inputs_outside_the_reply_form() {
        let html = r#"<script>var s = '<form id="post">';</script>
            <form id="post"><textarea id="main-reply"></textarea></form>
            <input type="hidden" name="later" value="1">"#;
        let form = parse_reply_form(html, &page_url(), &ForumConfig::default(), "x").unwrap();
        assert_eq!(
            form.fields,
            vec![
                ("req_message".to_string(), "x".to_string()),
                ("submit".to_string(), "Submit".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn submission_close_aborts_pending_work() {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let submission = Submission::spawn(TopicId(1), async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            let _ = tx.send(());
        });
        assert!(!submission.is_finished());
        submission.close();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn form_submitter_posts_reply_to_form_action() {
        let (tx, mut rx) = mpsc::unbounded_channel::<HashMap<String, String>>();

        let view = warp::get()
            .and(warp::path("viewtopic.php"))
            .map(|| warp::reply::html(PAGE));
        let post = warp::post()
            .and(warp::path("post.php"))
            .and(warp::body::form::<HashMap<String, String>>())
            .map(move |form: HashMap<String, String>| {
                let _ = tx.send(form);
                "ok"
            });
        let (addr, server) =
            warp::serve(view.or(post)).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let submitter =
            ReplyFormSubmitter::new(ForumConfig::new(format!("http://{addr}"))).unwrap();
        let submission = submitter.submit(TopicId(5), r#"{"a":[1]}"#).await.unwrap();

        let form = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(form["req_message"], r#"{"a":[1]}"#);
        assert_eq!(form["csrf_token"], "a&b");
        assert_eq!(form["submit"], "Send");
        submission.close();
    }
}
