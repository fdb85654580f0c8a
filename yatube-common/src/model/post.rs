use crate::{
    model::{
        Id, Text,
        group::{Group, GroupMarker},
        user::{User, UserMarker},
    },
    util::truncate_chars,
};
use std::fmt::{Display, Formatter};
use time::UtcDateTime;

/// Length of the short form a post is displayed with.
pub const POST_EXCERPT_LEN: usize = 15;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub text: Text,
    pub created_at: UtcDateTime,
    pub group: Option<Group>,
    pub author: User,
    /// Path relative to the media root, e.g. `posts/1a2b.gif`.
    pub image: Option<String>,
}

/// The editable part of a post.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostContent {
    pub text: Text,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub author: Id<UserMarker>,
    pub content: PostContent,
}

impl Post {
    #[must_use]
    pub fn excerpt(&self) -> &str {
        truncate_chars(self.text.get(), POST_EXCERPT_LEN)
    }

    #[must_use]
    pub fn content(&self) -> PostContent {
        PostContent {
            text: self.text.clone(),
            group: self.group.as_ref().map(|group| group.id),
            image: self.image.clone(),
        }
    }
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.excerpt())
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id, Text,
        post::Post,
        user::{User, Username},
    };
    use time::UtcDateTime;

    #[test]
    fn post_displays_first_fifteen_chars() {
        let post = Post {
            id: Id::new(1),
            text: Text::new("A test post longer than 15 characters".to_owned()).unwrap(),
            created_at: UtcDateTime::now(),
            group: None,
            author: User {
                id: Id::new(1),
                username: Username::new("auth".to_owned()).unwrap(),
            },
            image: None,
        };

        assert_eq!(post.to_string(), "A test post lon");
        assert_eq!(post.content().text, post.text);
    }
}
