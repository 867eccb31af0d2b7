//! Generated content: blog posts and social posts.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::{now, optional_uuid_column, string_list_column, uuid_column, StoreResult};

/// Status values for content rows.
pub mod status {
    pub const GENERATED: &str = "generated";
    pub const PUBLISHED: &str = "published";
    pub const POSTED: &str = "posted";
    pub const FAILED: &str = "failed";
}

#[derive(Debug, Clone, Serialize)]
pub struct BlogPostRecord {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub facebook_post_id: Option<String>,
    pub facebook_post_url: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewBlogPost {
    /// Id assigned by the generator, if it sent one.
    pub id: Option<Uuid>,
    pub meeting_id: Uuid,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
}

pub struct BlogPostRepository;

impl BlogPostRepository {
    pub fn insert(conn: &Connection, post: &NewBlogPost) -> StoreResult<BlogPostRecord> {
        let id = post.id.unwrap_or_else(Uuid::new_v4);
        let created_at = now();

        conn.execute(
            "INSERT INTO blog_posts (id, meeting_id, title, content, summary, keywords, status, \
             created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                id.to_string(),
                post.meeting_id.to_string(),
                post.title,
                post.content,
                post.summary,
                serde_json::to_string(&post.keywords)?,
                status::GENERATED,
                created_at,
            ],
        )?;

        Ok(BlogPostRecord {
            id,
            meeting_id: post.meeting_id,
            title: post.title.clone(),
            content: post.content.clone(),
            summary: post.summary.clone(),
            keywords: post.keywords.clone(),
            facebook_post_id: None,
            facebook_post_url: None,
            status: status::GENERATED.to_string(),
            created_at: created_at.clone(),
            updated_at: created_at,
        })
    }

    pub fn get_for_meeting(conn: &Connection, meeting_id: Uuid) -> StoreResult<Option<BlogPostRecord>> {
        let record = conn
            .query_row(
                "SELECT id, meeting_id, title, content, summary, keywords, facebook_post_id, \
                 facebook_post_url, status, created_at, updated_at FROM blog_posts WHERE meeting_id = ?1",
                params![meeting_id.to_string()],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Record the Facebook post on the blog post and mark it published.
    pub fn set_facebook_post(
        conn: &Connection,
        id: Uuid,
        post_id: Option<&str>,
        post_url: Option<&str>,
    ) -> StoreResult<bool> {
        let changed = conn.execute(
            "UPDATE blog_posts SET facebook_post_id = COALESCE(?1, facebook_post_id), \
             facebook_post_url = COALESCE(?2, facebook_post_url), status = ?3, updated_at = ?4 \
             WHERE id = ?5",
            params![post_id, post_url, status::PUBLISHED, now(), id.to_string()],
        )?;
        Ok(changed == 1)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<BlogPostRecord> {
        Ok(BlogPostRecord {
            id: uuid_column(row, 0)?,
            meeting_id: uuid_column(row, 1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            summary: row.get(4)?,
            keywords: string_list_column(row, 5)?,
            facebook_post_id: row.get(6)?,
            facebook_post_url: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SocialPostRecord {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub blog_post_id: Option<Uuid>,
    pub platform: String,
    pub external_post_id: Option<String>,
    pub external_post_url: Option<String>,
    pub image_url: Option<String>,
    pub content: String,
    pub status: String,
    pub platforms: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewSocialPost {
    pub meeting_id: Uuid,
    pub blog_post_id: Option<Uuid>,
    pub platform: String,
    pub image_url: Option<String>,
    pub content: String,
}

pub struct SocialPostRepository;

const SOCIAL_COLUMNS: &str = "id, meeting_id, blog_post_id, platform, external_post_id, \
     external_post_url, image_url, content, status, platforms, created_at, updated_at";

impl SocialPostRepository {
    pub fn insert(conn: &Connection, post: &NewSocialPost) -> StoreResult<SocialPostRecord> {
        let id = Uuid::new_v4();
        let created_at = now();

        conn.execute(
            "INSERT INTO social_posts (id, meeting_id, blog_post_id, platform, image_url, content, \
             status, platforms, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '[]', ?8, ?8)",
            params![
                id.to_string(),
                post.meeting_id.to_string(),
                post.blog_post_id.map(|id| id.to_string()),
                post.platform,
                post.image_url,
                post.content,
                status::GENERATED,
                created_at,
            ],
        )?;

        Ok(SocialPostRecord {
            id,
            meeting_id: post.meeting_id,
            blog_post_id: post.blog_post_id,
            platform: post.platform.clone(),
            external_post_id: None,
            external_post_url: None,
            image_url: post.image_url.clone(),
            content: post.content.clone(),
            status: status::GENERATED.to_string(),
            platforms: Vec::new(),
            created_at: created_at.clone(),
            updated_at: created_at,
        })
    }

    pub fn get(conn: &Connection, id: Uuid) -> StoreResult<Option<SocialPostRecord>> {
        let record = conn
            .query_row(
                &format!("SELECT {SOCIAL_COLUMNS} FROM social_posts WHERE id = ?1"),
                params![id.to_string()],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_for_meeting(conn: &Connection, meeting_id: Uuid) -> StoreResult<Vec<SocialPostRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SOCIAL_COLUMNS} FROM social_posts WHERE meeting_id = ?1 \
             ORDER BY created_at ASC, rowid ASC"
        ))?;

        let posts = stmt
            .query_map(params![meeting_id.to_string()], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    /// Newest social post for a meeting.
    pub fn latest_for_meeting(conn: &Connection, meeting_id: Uuid) -> StoreResult<Option<SocialPostRecord>> {
        let record = conn
            .query_row(
                &format!(
                    "SELECT {SOCIAL_COLUMNS} FROM social_posts WHERE meeting_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                params![meeting_id.to_string()],
                Self::from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Add `platform` to the post's published list. Returns `false` if it was
    /// already recorded.
    pub fn append_platform(conn: &Connection, id: Uuid, platform: &str) -> StoreResult<bool> {
        let Some(post) = Self::get(conn, id)? else {
            return Ok(false);
        };
        if post.platforms.iter().any(|p| p == platform) {
            return Ok(false);
        }

        let mut platforms = post.platforms;
        platforms.push(platform.to_string());

        conn.execute(
            "UPDATE social_posts SET platforms = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&platforms)?, now(), id.to_string()],
        )?;
        Ok(true)
    }

    /// Attach generated artwork (and optionally a caption) to an existing post.
    pub fn attach_artwork(
        conn: &Connection,
        id: Uuid,
        image_url: Option<&str>,
        content: Option<&str>,
    ) -> StoreResult<bool> {
        let changed = conn.execute(
            "UPDATE social_posts SET image_url = COALESCE(?1, image_url), \
             content = COALESCE(?2, content), updated_at = ?3 WHERE id = ?4",
            params![image_url, content, now(), id.to_string()],
        )?;
        Ok(changed == 1)
    }

    pub fn mark_posted(
        conn: &Connection,
        id: Uuid,
        external_post_id: Option<&str>,
        external_post_url: Option<&str>,
    ) -> StoreResult<()> {
        conn.execute(
            "UPDATE social_posts SET external_post_id = COALESCE(?1, external_post_id), \
             external_post_url = COALESCE(?2, external_post_url), status = ?3, updated_at = ?4 \
             WHERE id = ?5",
            params![external_post_id, external_post_url, status::POSTED, now(), id.to_string()],
        )?;
        Ok(())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<SocialPostRecord> {
        Ok(SocialPostRecord {
            id: uuid_column(row, 0)?,
            meeting_id: uuid_column(row, 1)?,
            blog_post_id: optional_uuid_column(row, 2)?,
            platform: row.get(3)?,
            external_post_id: row.get(4)?,
            external_post_url: row.get(5)?,
            image_url: row.get(6)?,
            content: row.get(7)?,
            status: row.get(8)?,
            platforms: string_list_column(row, 9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{migrate, MeetingRepository, NewMeeting};

    fn setup() -> (Connection, Uuid) {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let meeting = MeetingRepository::insert(
            &conn,
            &NewMeeting {
                title: "Launch".to_string(),
                organization_id: "org-1".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        (conn, meeting.id)
    }

    #[test]
    fn test_blog_post_roundtrip_with_keywords() {
        let (conn, meeting_id) = setup();
        let post = BlogPostRepository::insert(
            &conn,
            &NewBlogPost {
                meeting_id,
                title: "What we shipped".to_string(),
                content: "Body".to_string(),
                keywords: vec!["launch".to_string(), "roadmap".to_string()],
                ..Default::default()
            },
        )
        .unwrap();

        let stored = BlogPostRepository::get_for_meeting(&conn, meeting_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, post.id);
        assert_eq!(stored.keywords, vec!["launch", "roadmap"]);
        assert_eq!(stored.status, status::GENERATED);
    }

    #[test]
    fn test_second_blog_post_for_meeting_is_rejected() {
        let (conn, meeting_id) = setup();
        let post = NewBlogPost {
            meeting_id,
            title: "One".to_string(),
            content: "Body".to_string(),
            ..Default::default()
        };
        BlogPostRepository::insert(&conn, &post).unwrap();
        assert!(BlogPostRepository::insert(&conn, &post).is_err());
    }

    #[test]
    fn test_set_facebook_post_publishes() {
        let (conn, meeting_id) = setup();
        let post = BlogPostRepository::insert(
            &conn,
            &NewBlogPost {
                meeting_id,
                title: "Title".to_string(),
                content: "Body".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(BlogPostRepository::set_facebook_post(
            &conn,
            post.id,
            Some("fb_1"),
            Some("https://facebook.com/posts/fb_1")
        )
        .unwrap());

        let stored = BlogPostRepository::get_for_meeting(&conn, meeting_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.facebook_post_id.as_deref(), Some("fb_1"));
        assert_eq!(stored.status, status::PUBLISHED);
    }

    #[test]
    fn test_append_platform_is_idempotent() {
        let (conn, meeting_id) = setup();
        let post = SocialPostRepository::insert(
            &conn,
            &NewSocialPost {
                meeting_id,
                platform: "facebook".to_string(),
                content: "Caption".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(SocialPostRepository::append_platform(&conn, post.id, "facebook").unwrap());
        assert!(!SocialPostRepository::append_platform(&conn, post.id, "facebook").unwrap());
        assert!(SocialPostRepository::append_platform(&conn, post.id, "instagram").unwrap());

        let stored = SocialPostRepository::get(&conn, post.id).unwrap().unwrap();
        assert_eq!(stored.platforms, vec!["facebook", "instagram"]);
    }

    #[test]
    fn test_latest_for_meeting() {
        let (conn, meeting_id) = setup();
        assert!(SocialPostRepository::latest_for_meeting(&conn, meeting_id)
            .unwrap()
            .is_none());

        SocialPostRepository::insert(
            &conn,
            &NewSocialPost {
                meeting_id,
                platform: "facebook".to_string(),
                content: "first".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        let second = SocialPostRepository::insert(
            &conn,
            &NewSocialPost {
                meeting_id,
                platform: "facebook".to_string(),
                content: "second".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        let latest = SocialPostRepository::latest_for_meeting(&conn, meeting_id)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(
            SocialPostRepository::list_for_meeting(&conn, meeting_id)
                .unwrap()
                .len(),
            2
        );
    }
}
