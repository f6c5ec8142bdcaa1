use crate::record::{
    AuthenticationRecord, CommentRecord, CredentialsRecord, FullPostRecord, GroupRecord,
    UserRecord, to_primitive,
};
use sqlx::{
    SqlitePool,
    migrate::{MigrateError, Migrator},
    query, query_as, query_scalar,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use thiserror::Error;
use time::UtcDateTime;
use tracing::{debug, info};
use yatube_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication},
        comment::{Comment, CommentMarker, NewComment},
        follow::Follow,
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{NewPost, Post, PostMarker, PostUpdate},
        user::{CreateUser, User, UserCredentials, UserMarker, Username},
    },
    pagination::{Page, PageBounds, Paginator},
};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

static MIGRATOR: Migrator = sqlx::migrate!();

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Running database migrations failed: {0}")]
    Migrate(#[from] MigrateError),
}

/// Which posts a listing contains.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PostFilter {
    All,
    Group(Id<GroupMarker>),
    Author(Id<UserMarker>),
    /// Posts by every author the given user follows.
    FollowedBy(Id<UserMarker>),
}

impl PostFilter {
    fn condition(self) -> &'static str {
        match self {
            PostFilter::All => "",
            PostFilter::Group(_) => "WHERE posts.group_id = ?",
            PostFilter::Author(_) => "WHERE posts.author_id = ?",
            PostFilter::FollowedBy(_) => {
                "WHERE posts.author_id IN (
                    SELECT follows.author_id FROM follows WHERE follows.user_id = ?
                )"
            }
        }
    }

    fn argument(self) -> Option<i64> {
        match self {
            PostFilter::All => None,
            PostFilter::Group(group) => Some(group.get()),
            PostFilter::Author(user) | PostFilter::FollowedBy(user) => Some(user.get()),
        }
    }
}

const POST_SELECT: &str = "
    SELECT
        posts.id AS post_id,
        posts.text,
        posts.image,
        posts.pub_date,
        users.id AS user_id,
        users.username,
        users.first_name,
        users.last_name,
        post_groups.id AS group_id,
        post_groups.title AS group_title,
        post_groups.slug AS group_slug,
        post_groups.description AS group_description
    FROM
        posts
        JOIN users ON users.id = posts.author_id
        LEFT JOIN post_groups ON post_groups.id = posts.group_id
";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

#[derive(Clone, Debug)]
pub struct DbClient {
    pool: SqlitePool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `database_url` and brings its schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // In-memory databases live only as long as a connection to them does.
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        info!(database_url, "Connected to database");

        Ok(Self::new(pool))
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.id AS user_id,
                users.username,
                users.first_name,
                users.last_name
            FROM
                users
            WHERE
                users.id = ?
            ",
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.id AS user_id,
                users.username,
                users.first_name,
                users.last_name
            FROM
                users
            WHERE
                users.username = ?
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_credentials(&self, username: &Username) -> Result<Option<UserCredentials>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT
                users.id AS user_id,
                users.username,
                users.first_name,
                users.last_name,
                users.password_hash
            FROM
                users
            WHERE
                users.username = ?
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(UserCredentials::try_from).transpose()?;
        Ok(credentials)
    }

    /// Returns `None` when the username is already taken.
    pub async fn create_user(&self, user: &CreateUser) -> Result<Option<User>> {
        let result = query_as::<_, UserRecord>(
            "
            INSERT INTO users (username, first_name, last_name, password_hash)
            VALUES (?, ?, ?, ?)
            RETURNING
                users.id AS user_id,
                users.username,
                users.first_name,
                users.last_name
            ",
        )
        .bind(user.username.get())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.password.get())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(Some(record.try_into()?)),
            Err(err) if is_unique_violation(&err) => {
                debug!(username = %user.username, "Username already taken");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn create_authentication(&self, authentication: &Authentication) -> Result<()> {
        query(
            "
            INSERT INTO authentications (token_hash, user_id, created_at, expires_after_seconds)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(&authentication.token_hash.0[..])
        .bind(authentication.user.get())
        .bind(to_primitive(authentication.created_at))
        .bind(
            authentication
                .expires_after
                .map(|expires_after| expires_after.get().whole_seconds()),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT
                authentications.user_id,
                authentications.token_hash,
                authentications.created_at,
                authentications.expires_after_seconds
            FROM
                authentications
            WHERE
                authentications.token_hash = ?
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }

    pub async fn delete_authentication(&self, token_hash: &AuthTokenHash) -> Result<bool> {
        let result = query("DELETE FROM authentications WHERE token_hash = ?")
            .bind(&token_hash.0[..])
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns `None` when the slug is already taken.
    pub async fn create_group(&self, group: &CreateGroup) -> Result<Option<Group>> {
        let result = query_as::<_, GroupRecord>(
            "
            INSERT INTO post_groups (title, slug, description)
            VALUES (?, ?, ?)
            RETURNING
                post_groups.id AS group_id,
                post_groups.title,
                post_groups.slug,
                post_groups.description
            ",
        )
        .bind(&group.title)
        .bind(group.slug.get())
        .bind(&group.description)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(Some(record.try_into()?)),
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT
                post_groups.id AS group_id,
                post_groups.title,
                post_groups.slug,
                post_groups.description
            FROM
                post_groups
            WHERE
                post_groups.id = ?
            ",
        )
        .bind(group_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    pub async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT
                post_groups.id AS group_id,
                post_groups.title,
                post_groups.slug,
                post_groups.description
            FROM
                post_groups
            WHERE
                post_groups.slug = ?
            ",
        )
        .bind(slug.get())
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    pub async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let records = query_as::<_, GroupRecord>(
            "
            SELECT
                post_groups.id AS group_id,
                post_groups.title,
                post_groups.slug,
                post_groups.description
            FROM
                post_groups
            ORDER BY
                post_groups.title,
                post_groups.id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let groups = records
            .into_iter()
            .map(Group::try_from)
            .collect::<Result<_, _>>()?;
        Ok(groups)
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Id<PostMarker>> {
        let post_id = query_scalar::<_, i64>(
            "
            INSERT INTO posts (text, author_id, group_id, image, pub_date)
            VALUES (?, ?, ?, ?, ?)
            RETURNING posts.id
            ",
        )
        .bind(post.text.get())
        .bind(post.author.get())
        .bind(post.group.map(Id::get))
        .bind(post.image.as_deref())
        .bind(to_primitive(UtcDateTime::now()))
        .fetch_one(&self.pool)
        .await?;

        Ok(post_id.into())
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let sql = format!("{POST_SELECT} WHERE posts.id = ?");
        let record = query_as::<_, FullPostRecord>(&sql)
            .bind(post_id.get())
            .fetch_optional(&self.pool)
            .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    /// Returns whether the post existed.
    pub async fn update_post(&self, post_id: Id<PostMarker>, update: &PostUpdate) -> Result<bool> {
        let result = query(
            "
            UPDATE posts
            SET text = ?, group_id = ?, image = ?
            WHERE posts.id = ?
            ",
        )
        .bind(update.text.get())
        .bind(update.group.map(Id::get))
        .bind(update.image.as_deref())
        .bind(post_id.get())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes a post together with its comments. Returns whether the post existed.
    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts WHERE posts.id = ?")
            .bind(post_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM posts {}", filter.condition());
        let mut count_query = query_scalar::<_, i64>(&sql);
        if let Some(argument) = filter.argument() {
            count_query = count_query.bind(argument);
        }

        let count = count_query.fetch_one(&self.pool).await?;
        Ok(count.cast_unsigned())
    }

    /// Posts matching `filter` inside `bounds`, newest first.
    pub async fn fetch_posts(&self, filter: PostFilter, bounds: PageBounds) -> Result<Vec<Post>> {
        let sql = format!(
            "{POST_SELECT} {} ORDER BY posts.pub_date DESC, posts.id DESC LIMIT ? OFFSET ?",
            filter.condition()
        );
        let mut posts_query = query_as::<_, FullPostRecord>(&sql);
        if let Some(argument) = filter.argument() {
            posts_query = posts_query.bind(argument);
        }

        let records = posts_query
            .bind(bounds.limit.cast_signed())
            .bind(bounds.offset.cast_signed())
            .fetch_all(&self.pool)
            .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    /// Resolves the raw `page` query value against the listing and fetches that page.
    pub async fn fetch_posts_page(
        &self,
        filter: PostFilter,
        raw_page: Option<&str>,
    ) -> Result<Page<Post>> {
        let paginator = Paginator::new(self.count_posts(filter).await?);
        let number = paginator.get_page(raw_page);
        let posts = self.fetch_posts(filter, paginator.page_bounds(number)).await?;

        Ok(Page::new(paginator, number, posts))
    }

    /// Returns `None` when the post or the author no longer exists.
    pub async fn create_comment(&self, comment: &NewComment) -> Result<Option<Id<CommentMarker>>> {
        let result = query_scalar::<_, i64>(
            "
            INSERT INTO comments (post_id, author_id, text, created)
            VALUES (?, ?, ?, ?)
            RETURNING comments.id
            ",
        )
        .bind(comment.post.get())
        .bind(comment.author.get())
        .bind(comment.text.get())
        .bind(to_primitive(UtcDateTime::now()))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(comment_id) => Ok(Some(comment_id.into())),
            Err(err) if is_foreign_key_violation(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Comments on a post, oldest first.
    pub async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.id AS comment_id,
                comments.post_id,
                comments.text,
                comments.created,
                users.id AS user_id,
                users.username,
                users.first_name,
                users.last_name
            FROM
                comments
                JOIN users ON users.id = comments.author_id
            WHERE
                comments.post_id = ?
            ORDER BY
                comments.created,
                comments.id
            ",
        )
        .bind(post_id.get())
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    /// Returns whether a new subscription was stored. An existing one is left as is.
    pub async fn create_follow(&self, follow: Follow) -> Result<bool> {
        let result = query("INSERT INTO follows (user_id, author_id) VALUES (?, ?)")
            .bind(follow.user().get())
            .bind(follow.author().get())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => {
                debug!(user = %follow.user(), author = %follow.author(), "Already following");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns whether a subscription was removed.
    pub async fn delete_follow(
        &self,
        user: Id<UserMarker>,
        author: Id<UserMarker>,
    ) -> Result<bool> {
        let result = query("DELETE FROM follows WHERE user_id = ? AND author_id = ?")
            .bind(user.get())
            .bind(author.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(
        &self,
        user: Id<UserMarker>,
        author: Id<UserMarker>,
    ) -> Result<bool> {
        let following = query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = ? AND author_id = ?)",
        )
        .bind(user.get())
        .bind(author.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(following)
    }
}
