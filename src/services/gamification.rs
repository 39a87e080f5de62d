//! Points, levels, badges and missions

use chrono::Utc;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::{Error as FailureError, Fail};
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use super::{current_user, Error, ErrorKind, Service};
use crate::http::controller::error_chain_text;
use crate::models::*;
use crate::repos::ReposFactory;

pub trait GamificationService {
    /// Points, level, badges and mission progress of the current user
    fn profile(&self) -> ServiceFuture<GamificationProfile>;
    fn badges(&self) -> ServiceFuture<Vec<Badge>>;
    fn missions(&self) -> ServiceFuture<Vec<Mission>>;
    /// Top users by points
    fn leaderboard(&self) -> ServiceFuture<Vec<LeaderboardEntry>>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > GamificationService for Service<T, M, F>
{
    fn profile(&self) -> ServiceFuture<GamificationProfile> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let user = current_user(&repo_factory, &*conn, user_id)?;
            debug!("Getting gamification profile of user {}", user.id);
            let gamification_repo = repo_factory.create_gamification_repo(&*conn, user_id);

            let points = {
                let user = &user;
                gamification_repo
                    .get_state(user.id)
                    .map_err(ectx!(try convert => user.id))?
                    .map(|state| state.points)
                    .unwrap_or(0)
            };
            let level = level_for_points(points);
            let badges = {
                let user = &user;
                gamification_repo.user_badges(user.id).map_err(ectx!(try convert => user.id))?
            };
            let progress = {
                let user = &user;
                gamification_repo.user_missions(user.id).map_err(ectx!(try convert => user.id))?
            };
            let missions = gamification_repo
                .list_missions(None)
                .map_err(ectx!(try convert))?
                .into_iter()
                .map(|mission| {
                    let user_mission = progress.iter().find(|p| p.mission_id == mission.id);
                    MissionProgress {
                        progress: user_mission.map(|p| p.progress).unwrap_or(0),
                        completed: user_mission.map(UserMission::is_completed).unwrap_or(false),
                        mission,
                    }
                })
                .collect();

            Ok(GamificationProfile {
                user_id: user.id,
                points,
                level,
                next_level_points: points_for_level(i64::from(level) + 1),
                badges,
                missions,
            })
        })
    }

    fn badges(&self) -> ServiceFuture<Vec<Badge>> {
        debug!("Listing badges");
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let gamification_repo = repo_factory.create_gamification_repo(&*conn, user_id);
            gamification_repo.list_badges().map_err(ectx!(convert))
        })
    }

    fn missions(&self) -> ServiceFuture<Vec<Mission>> {
        debug!("Listing missions");
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;

        self.spawn_on_pool(move |conn| {
            let gamification_repo = repo_factory.create_gamification_repo(&*conn, user_id);
            gamification_repo.list_missions(None).map_err(ectx!(convert))
        })
    }

    fn leaderboard(&self) -> ServiceFuture<Vec<LeaderboardEntry>> {
        let repo_factory = self.static_context.repo_factory.clone();
        let user_id = self.dynamic_context.user_id;
        let limit = self.static_context.config.gamification.leaderboard_size;
        debug!("Getting leaderboard of {} users", limit);

        self.spawn_on_pool(move |conn| {
            let gamification_repo = repo_factory.create_gamification_repo(&*conn, user_id);
            gamification_repo.leaderboard(limit).map_err(ectx!(convert => limit))
        })
    }
}

/// Grants event points, advances missions and awards badges
pub fn apply_events<T, F>(repo_factory: &F, conn: &T, events: &[GamificationEvent]) -> Result<(), Error>
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    let gamification_repo = repo_factory.create_gamification_repo_with_sys_acl(conn);

    for event in events {
        let user_id = event.user_id();
        let mut points = event.points();

        let missions = gamification_repo
            .list_missions(Some(event.mission_kind()))
            .map_err(ectx!(try convert => event))?;
        if !missions.is_empty() {
            let progress = gamification_repo.user_missions(user_id).map_err(ectx!(try convert => user_id))?;
            for mission in missions {
                let current = progress.iter().find(|p| p.mission_id == mission.id).cloned().unwrap_or(UserMission {
                    user_id,
                    mission_id: mission.id,
                    progress: 0,
                    completed_at: None,
                });
                if current.is_completed() {
                    continue;
                }

                let new_progress = current.progress.saturating_add(1).min(mission.target);
                let completed_at = if new_progress >= mission.target {
                    info!("User {} completed mission {}", user_id, mission.code);
                    points = points.saturating_add(mission.reward_points);
                    Some(Utc::now().naive_utc())
                } else {
                    None
                };
                gamification_repo
                    .save_mission_progress(UserMission {
                        progress: new_progress,
                        completed_at,
                        ..current
                    })
                    .map_err(ectx!(try convert => user_id, mission.id))?;
            }
        }

        if points <= 0 {
            continue;
        }

        let state = gamification_repo.add_points(user_id, points).map_err(ectx!(try convert => user_id, points))?;
        let reached = gamification_repo
            .list_badges()
            .map_err(ectx!(try convert))?
            .into_iter()
            .filter(|badge| badge.points_required <= state.points)
            .map(|badge| badge.id)
            .collect::<Vec<_>>();
        if !reached.is_empty() {
            let awarded = gamification_repo.award_badges(user_id, reached).map_err(ectx!(try convert => user_id))?;
            for badge in awarded {
                info!("User {} was awarded badge {}", user_id, badge.badge_id);
            }
        }
    }

    Ok(())
}

/// `apply_events` whose failures are only logged
pub fn apply_events_logged<T, F>(repo_factory: &F, conn: &T, events: &[GamificationEvent])
where
    T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
    F: ReposFactory<T>,
{
    if let Err(e) = apply_events(repo_factory, conn, events) {
        error!("Failed to apply gamification events {:?}: {}", events, error_chain_text(&FailureError::from(e)));
    }
}
