//! Moderated discussions over Nostr.
//!
//! Discussions are NIP-72 communities (kind 34550). Posts are kind 1111
//! comments addressed to a discussion, moderators approve them with kind 4550
//! events and revoke approvals by deleting them (kind 5). Anyone may evaluate
//! a post with a kind 7 `+`/`-` rating.
//!
//! This crate provides:
//! - Event template builders for every action ([`builders`])
//! - Parsers from events to domain values ([`parsers`]) and aggregation into
//!   views ([`aggregate`])
//! - A service over a shared relay pool ([`NostrService`])
//! - The moderation controller with optimistic updates ([`ModerationController`])
//! - The bus-stop memo controller ([`MemoController`])
//!
//! Signing is external: plug in any [`Signer`].
//!
//! # Example
//!
//! ```rust,no_run
//! use discussions::{ServiceConfig, create_nostr_service};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), discussions::ServiceError> {
//!     let service = create_nostr_service(ServiceConfig::default())?;
//!     for discussion in service.load_discussions().await {
//!         println!("{} ({} moderators)", discussion.title, discussion.moderators.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod auth;
pub mod builders;
pub mod config;
pub mod load;
pub mod memo;
pub mod moderation;
pub mod parsers;
pub mod service;
pub mod signer;
pub mod types;

pub use aggregate::{
    build_posts, combine_posts_with_stats, community_memo, exclude_deleted_discussions,
    exclude_revoked_approvals, latest_discussions, pick_latest_discussion, sort_posts_by_score,
    user_rating,
};
pub use auth::{is_admin, is_moderator};
pub use builders::{
    BuildError, create_approval_event, create_delete_event, create_discussion_delete_event,
    create_discussion_event, create_discussion_request_event, create_evaluation_event,
    create_evaluation_event_str, create_post_event,
};
pub use config::ServiceConfig;
pub use load::{LoadSequence, LoadTicket};
pub use memo::{MemoController, MemoInputs, MemoView, update_from_events};
pub use moderation::{
    ModerationController, ModerationError, ModerationSnapshot, ModerationStatus, moderation_status,
};
pub use parsers::{
    DomainEvent, parse_approval_event, parse_deletion_event, parse_discussion_event,
    parse_discussion_request_event, parse_evaluation_event, parse_post_event, parse_profile_event,
};
pub use service::{NostrService, ServiceError, create_nostr_service};
pub use signer::{Signer, SignerError};
pub use types::{
    DeletionRequest, Discussion, DiscussionPost, DiscussionRequest, InvalidRating, Moderator,
    PostApproval, PostEvaluation, PostWithStats, Profile, Rating, discussion_id,
    parse_discussion_id,
};
