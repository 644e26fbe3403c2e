//! Plain-text rendering of content lists.

use futures::future::join_all;

use crate::content::{Content, MentionContent, ShareContent};
use crate::error::StoreResult;
use crate::store::Store;

/// Display name of a user: group card, then nickname, then the raw id.
pub async fn nickname(store: &dyn Store, user_id: &str, group_id: Option<&str>) -> StoreResult<String> {
    if let Some(group_id) = group_id
        && let Some(member) = store.member(group_id, user_id).await?
        && !member.card.is_empty()
    {
        return Ok(member.card);
    }
    Ok(store
        .user(user_id)
        .await?
        .map(|u| u.name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| user_id.to_owned()))
}

async fn mention_text(store: &dyn Store, mention: &MentionContent, group_id: Option<&str>) -> String {
    if mention.is_all() {
        return "@everyone".to_owned();
    }
    let name = nickname(store, &mention.target, group_id)
        .await
        .unwrap_or_else(|_| mention.target.clone());
    format!("@{name}")
}

async fn render(store: &dyn Store, content: &Content, group_id: Option<&str>) -> String {
    match content {
        Content::Text(t) => t.text.clone(),
        Content::Mention(m) => mention_text(store, m, group_id).await,
        Content::Reply(_) => "[reply] ".to_owned(),
        Content::Face(f) => format!("[face:{}]", f.name),
        Content::Dice(_) => "[dice]".to_owned(),
        Content::Rps(_) => "[rps]".to_owned(),
        Content::Poke(_) => "[poke]".to_owned(),
        Content::Shake(_) => "[shake]".to_owned(),
        Content::Anonymous(_) | Content::Node(_) => String::new(),
        Content::Share(ShareContent::Link(_)) => "[link share]".to_owned(),
        Content::Share(ShareContent::Music(_)) => "[music share]".to_owned(),
        Content::Contact(_) => "[contact]".to_owned(),
        Content::Location(_) => "[location]".to_owned(),
        Content::File(_) => "[file]".to_owned(),
        Content::Image(_) => "[image]".to_owned(),
        Content::Voice(_) => "[voice]".to_owned(),
        Content::Video(_) => "[video]".to_owned(),
        Content::Forward(_) => "[forward]".to_owned(),
    }
}

/// Flattens `contents` into one line of text. Mentions resolve against
/// `group_id` when the message belongs to a group.
pub async fn plain_message(store: &dyn Store, contents: &[Content], group_id: Option<&str>) -> String {
    join_all(contents.iter().map(|c| render(store, c, group_id)))
        .await
        .concat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Member, MemoryStore, Role, User};

    #[tokio::test]
    async fn test_plain_message() {
        let store = MemoryStore::new();
        store.put_user(User::new("2", "Alice")).await.unwrap();
        let mut member = Member::new("g", "2", Role::Member);
        member.card = "Ali".into();
        store.put_member(member).await.unwrap();

        let contents = vec![
            Content::reply("10001", "2"),
            Content::mention("2"),
            Content::text(" hi "),
            Content::mention_all(),
            Content::image("id", "url"),
        ];
        assert_eq!(
            plain_message(&store, &contents, Some("g")).await,
            "[reply] @Ali hi @everyone[image]"
        );
        assert_eq!(
            plain_message(&store, &contents[1..2], None).await,
            "@Alice"
        );
        assert_eq!(plain_message(&store, &[Content::mention("9")], None).await, "@9");
    }
}
