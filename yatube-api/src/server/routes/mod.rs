use crate::server::ServerRouter;

mod about;
mod auth;
mod follow;
mod groups;
mod posts;
mod profiles;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(posts::routes())
        .merge(groups::routes())
        .merge(profiles::routes())
        .merge(follow::routes())
        .merge(about::routes())
        .merge(auth::routes())
}
