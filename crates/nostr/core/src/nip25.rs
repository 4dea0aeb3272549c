//! NIP-25: Reactions
//!
//! Kind 7 reactions target an event with an `e` tag. Content `+` is a like and
//! `-` a dislike; anything else is an emoji reaction.

/// Kind for reactions.
pub const KIND_REACTION: u16 = 7;

/// Content of a like.
pub const REACTION_LIKE: &str = "+";

/// Content of a dislike.
pub const REACTION_DISLIKE: &str = "-";

/// Build the tags of a reaction to `event_id` authored by `author`.
pub fn create_reaction_tags(
    event_id: &str,
    author: Option<&str>,
    kind: Option<u16>,
) -> Vec<Vec<String>> {
    let mut tags = vec![vec!["e".to_string(), event_id.to_string()]];
    if let Some(author) = author {
        tags.push(vec!["p".to_string(), author.to_string()]);
    }
    if let Some(kind) = kind {
        tags.push(vec!["k".to_string(), kind.to_string()]);
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_reaction_tags() {
        assert_eq!(create_reaction_tags("e1", None, None), vec![vec!["e", "e1"]]);
        let tags = create_reaction_tags("e1", Some("bob"), Some(1111));
        assert_eq!(tags[1], vec!["p", "bob"]);
        assert_eq!(tags[2], vec!["k", "1111"]);
    }
}
