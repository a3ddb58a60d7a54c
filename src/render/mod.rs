//! Per-recipient newsletter rendering.
//!
//! Rendering is deterministic: the same subscriber and release list always
//! produce the same subject, body, and cid mapping. Covers are embedded
//! under the `item_<index>` content-id scheme, where the index is the item's
//! zero-based position in the release list shared by the whole cycle, so
//! every recipient sees the same cid for the same title.

use crate::assets::AssetStore;
use crate::content::{ReleaseItem, Subscriber};

/// Fixed subject line for every newsletter issue.
pub const SUBJECT: &str = "New video game releases this week!";

/// Per-subscriber render failure. Treated as that subscriber's outcome,
/// never as a cycle failure.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("subscriber {0} has an empty email address")]
    EmptyRecipient(uuid::Uuid),
}

/// An asset embedded in a rendered message, referenced from the body by cid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedAsset {
    pub cid: String,
    pub content: Vec<u8>,
    pub mime: String,
}

/// One subscriber's fully rendered newsletter, consumed exactly once by the
/// delivery engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    /// Embeds ordered by item index; items whose cover did not resolve have
    /// no entry here and no image in the body.
    pub embeds: Vec<EmbeddedAsset>,
}

/// Builds one [`RenderedMessage`] per subscriber from the shared release
/// list, resolving covers through an [`AssetStore`].
pub struct Renderer<'a, A: AssetStore> {
    assets: &'a A,
}

impl<'a, A: AssetStore> Renderer<'a, A> {
    pub fn new(assets: &'a A) -> Self {
        Self { assets }
    }

    /// Render the newsletter for one subscriber.
    ///
    /// Cover resolution failures never fail the render: an absent asset or
    /// an asset-store error leaves the item in the body without an image.
    pub async fn render(
        &self,
        subscriber: &Subscriber,
        releases: &[ReleaseItem],
    ) -> Result<RenderedMessage, RenderError> {
        if subscriber.email.is_empty() {
            return Err(RenderError::EmptyRecipient(subscriber.id));
        }

        let mut embeds = Vec::new();
        let mut sections = String::new();

        for (index, item) in releases.iter().enumerate() {
            let cid = item_cid(index);
            let embedded = match &item.cover_asset {
                Some(asset_id) => match self.assets.resolve(asset_id).await {
                    Ok(Some(asset)) => {
                        embeds.push(EmbeddedAsset {
                            cid: cid.clone(),
                            content: asset.content,
                            mime: asset.mime,
                        });
                        true
                    }
                    Ok(None) => false,
                    Err(e) => {
                        tracing::warn!(asset_id = %asset_id, error = %e, "cover lookup failed");
                        false
                    }
                },
                None => false,
            };
            push_section(&mut sections, item, &cid, embedded);
        }

        let html = format!(
            "<html><body>\n\
             <h1>{SUBJECT}</h1>\n\
             <p>Hello {email}, these titles release in the coming days:</p>\n\
             {sections}\
             </body></html>",
            email = escape_html(&subscriber.email),
        );

        Ok(RenderedMessage {
            to: subscriber.email.clone(),
            subject: SUBJECT.to_string(),
            html,
            embeds,
        })
    }
}

/// Stable content id for the item at `index` in the cycle's release list.
fn item_cid(index: usize) -> String {
    format!("item_{index}")
}

fn push_section(out: &mut String, item: &ReleaseItem, cid: &str, embedded: bool) {
    out.push_str("<section>\n");
    out.push_str(&format!("<h2>{}</h2>\n", escape_html(&item.title)));
    if embedded {
        out.push_str(&format!(
            "<img src=\"cid:{cid}\" alt=\"{} cover\"/>\n",
            escape_html(&item.title)
        ));
    }
    out.push_str(&format!("<p>Release date: {}</p>\n", item.release_date));
    out.push_str(&format!("<p>{}</p>\n", escape_html(&item.description)));
    out.push_str("</section>\n");
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::InMemoryAssets;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn subscriber(email: &str) -> Subscriber {
        Subscriber {
            id: Uuid::new_v4(),
            email: email.to_string(),
            subscribed: true,
        }
    }

    fn release(title: &str, cover: Option<&str>) -> ReleaseItem {
        ReleaseItem {
            title: title.to_string(),
            release_date: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            description: format!("About {title}"),
            cover_asset: cover.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn render_is_deterministic() {
        let assets = InMemoryAssets::new().insert("a.png", b"img".to_vec(), "image/png");
        let renderer = Renderer::new(&assets);
        let sub = subscriber("a@example.com");
        let releases = vec![release("Alpha", Some("a.png")), release("Beta", None)];

        let first = renderer.render(&sub, &releases).await.unwrap();
        let second = renderer.render(&sub, &releases).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cids_follow_item_position() {
        let assets = InMemoryAssets::new()
            .insert("a.png", b"a".to_vec(), "image/png")
            .insert("c.png", b"c".to_vec(), "image/png");
        let renderer = Renderer::new(&assets);
        let releases = vec![
            release("Alpha", Some("a.png")),
            release("Beta", None),
            release("Gamma", Some("c.png")),
        ];

        let message = renderer
            .render(&subscriber("a@example.com"), &releases)
            .await
            .unwrap();

        // Beta has no cover, so only items 0 and 2 are embedded, and the
        // index-based cids are unaffected by the gap.
        let cids: Vec<_> = message.embeds.iter().map(|e| e.cid.as_str()).collect();
        assert_eq!(cids, vec!["item_0", "item_2"]);
        assert!(message.html.contains("cid:item_0"));
        assert!(message.html.contains("cid:item_2"));
        assert!(!message.html.contains("cid:item_1"));
    }

    #[tokio::test]
    async fn unresolvable_cover_degrades_to_no_image() {
        let assets = InMemoryAssets::new();
        let renderer = Renderer::new(&assets);
        let releases = vec![release("Alpha", Some("missing.png"))];

        let message = renderer
            .render(&subscriber("a@example.com"), &releases)
            .await
            .unwrap();

        assert!(message.embeds.is_empty());
        assert!(message.html.contains("Alpha"));
        assert!(!message.html.contains("<img"));
    }

    #[tokio::test]
    async fn empty_email_is_a_render_error() {
        let assets = InMemoryAssets::new();
        let renderer = Renderer::new(&assets);

        let result = renderer.render(&subscriber(""), &[release("Alpha", None)]).await;
        assert!(matches!(result, Err(RenderError::EmptyRecipient(_))));
    }

    #[tokio::test]
    async fn body_escapes_markup_in_content() {
        let assets = InMemoryAssets::new();
        let renderer = Renderer::new(&assets);
        let releases = vec![release("Tomb <Raider> & Co", None)];

        let message = renderer
            .render(&subscriber("a@example.com"), &releases)
            .await
            .unwrap();

        assert!(message.html.contains("Tomb &lt;Raider&gt; &amp; Co"));
    }
}
