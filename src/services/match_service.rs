//! Match lifecycle: mutual-like creation, level progression, unmatch.

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::ChatEvent;
use crate::models::Match;
use crate::pubsub::messages_channel;
use crate::state::AppState;

pub struct MatchService;

#[derive(Debug)]
pub struct LikeOutcome {
    pub matched: bool,
    pub match_record: Option<Match>,
}

impl MatchService {
    /// Records a like. When the like is reciprocal a match is created at
    /// level 1 with its conversation; repeating a like is a no-op and
    /// returns the existing match.
    pub async fn like(state: &AppState, from_user: Uuid, to_user: Uuid) -> AppResult<LikeOutcome> {
        if from_user == to_user {
            return Err(AppError::Validation("cannot like yourself".into()));
        }
        state.store.insert_like(from_user, to_user).await?;

        if !state.store.has_like(to_user, from_user).await? {
            return Ok(LikeOutcome {
                matched: false,
                match_record: None,
            });
        }

        if let Some(existing) = state.store.find_match_between(from_user, to_user).await? {
            return Ok(LikeOutcome {
                matched: true,
                match_record: Some(existing),
            });
        }

        let m = Match::new(from_user, to_user);
        state.store.create_match(&m).await?;
        let conversation = state.store.get_or_create_conversation(&m).await?;
        state
            .channels
            .publish(
                &messages_channel(conversation.id),
                &ChatEvent::MatchLevel {
                    match_id: m.id,
                    conversation_id: Some(conversation.id),
                    level: m.level,
                },
            )
            .await;
        tracing::info!(match_id = %m.id, "mutual like, match created");
        Ok(LikeOutcome {
            matched: true,
            match_record: Some(m),
        })
    }

    pub async fn get(state: &AppState, match_id: Uuid) -> AppResult<Match> {
        state.store.get_match(match_id).await?.ok_or(AppError::NotFound)
    }

    /// Level progression is monotonic: the new level must be strictly above
    /// the current one and within the deployment's maximum.
    pub async fn advance_level(state: &AppState, match_id: Uuid, level: i32) -> AppResult<Match> {
        let mut m = Self::get(state, match_id).await?;
        if !m.is_active {
            return Err(AppError::Forbidden("match is no longer active".into()));
        }
        if level <= m.level {
            return Err(AppError::Validation(format!(
                "level must advance (current {})",
                m.level
            )));
        }
        if level > state.capabilities.max_level {
            return Err(AppError::Validation(format!(
                "level exceeds maximum {}",
                state.capabilities.max_level
            )));
        }
        state.store.set_match_level(match_id, level).await?;
        m.level = level;

        let conversation = state.store.conversation_for_match(match_id).await?;
        if let Some(ref conversation) = conversation {
            state
                .channels
                .publish(
                    &messages_channel(conversation.id),
                    &ChatEvent::MatchLevel {
                        match_id,
                        conversation_id: Some(conversation.id),
                        level,
                    },
                )
                .await;
        }
        tracing::info!(%match_id, level, "match level advanced");
        Ok(m)
    }

    /// Soft unmatch: the match stops accepting messages and calls but its
    /// history is retained.
    pub async fn unmatch(state: &AppState, match_id: Uuid) -> AppResult<()> {
        let m = Self::get(state, match_id).await?;
        if !m.is_active {
            return Ok(());
        }
        state.store.deactivate_match(match_id).await?;
        tracing::info!(%match_id, "match deactivated");
        Ok(())
    }

    /// Jaccard overlap of two interest lists, scaled to 0..=100. Two empty
    /// lists score 0.
    pub fn compatibility_score(a: &[String], b: &[String]) -> u8 {
        use std::collections::HashSet;
        let set_a: HashSet<&str> = a.iter().map(|s| s.as_str()).collect();
        let set_b: HashSet<&str> = b.iter().map(|s| s.as_str()).collect();
        let union = set_a.union(&set_b).count();
        if union == 0 {
            return 0;
        }
        let intersection = set_a.intersection(&set_b).count();
        ((intersection as f64 / union as f64) * 100.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn compatibility_is_jaccard_percent() {
        let a = strings(&["hiking", "jazz", "cooking"]);
        let b = strings(&["jazz", "cooking", "film"]);
        // 2 shared out of 4 distinct
        assert_eq!(MatchService::compatibility_score(&a, &b), 50);
    }

    #[test]
    fn compatibility_handles_empty_and_identical() {
        assert_eq!(MatchService::compatibility_score(&[], &[]), 0);
        let a = strings(&["tea"]);
        assert_eq!(MatchService::compatibility_score(&a, &a.clone()), 100);
        assert_eq!(MatchService::compatibility_score(&a, &[]), 0);
    }
}
