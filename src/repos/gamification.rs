//! Repo for badges, missions and per-user gamification state

use chrono::Utc;
use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::upsert::excluded;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Fail;

use crate::models::authorization::*;
use crate::models::{
    level_for_points, Badge, BadgeId, LeaderboardEntry, Mission, MissionKind, UserBadge, UserGamification, UserId, UserMission,
};
use crate::schema::badges::dsl as Badges;
use crate::schema::missions::dsl as Missions;
use crate::schema::user_badges::dsl as UserBadges;
use crate::schema::user_gamification::dsl as UserGamifications;
use crate::schema::user_missions::dsl as UserMissions;
use crate::schema::users::dsl as Users;
use crate::schema::{badges, missions};

use super::acl::{self, Acl, CheckScope};
use super::error::*;
use super::types::RepoResult;

pub type GamificationRepoAcl = Box<dyn Acl<UserGamification>>;

pub trait GamificationRepo {
    fn get_state(&self, user_id: UserId) -> RepoResult<Option<UserGamification>>;

    /// Adds `points` to the user and recalculates the level
    fn add_points(&self, user_id: UserId, points: i32) -> RepoResult<UserGamification>;

    fn list_badges(&self) -> RepoResult<Vec<Badge>>;

    fn user_badges(&self, user_id: UserId) -> RepoResult<Vec<Badge>>;

    /// Awards badges the user does not have yet, returns only the new ones
    fn award_badges(&self, user_id: UserId, badge_ids: Vec<BadgeId>) -> RepoResult<Vec<UserBadge>>;

    fn list_missions(&self, kind: Option<MissionKind>) -> RepoResult<Vec<Mission>>;

    fn user_missions(&self, user_id: UserId) -> RepoResult<Vec<UserMission>>;

    fn save_mission_progress(&self, payload: UserMission) -> RepoResult<UserMission>;

    fn leaderboard(&self, limit: i64) -> RepoResult<Vec<LeaderboardEntry>>;
}

pub struct GamificationRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
    pub acl: GamificationRepoAcl,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> GamificationRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T, acl: GamificationRepoAcl) -> Self {
        Self { db_conn, acl }
    }

    fn check_write(&self, user_id: UserId) -> RepoResult<()> {
        acl::check(&*self.acl, Resource::Gamification, Action::All, self, None).map_err(ectx!(try ErrorKind::Forbidden => user_id))
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> GamificationRepo for GamificationRepoImpl<'a, T> {
    fn get_state(&self, user_id: UserId) -> RepoResult<Option<UserGamification>> {
        debug!("Getting gamification state of user {}", user_id);

        let state = UserGamifications::user_gamification
            .filter(UserGamifications::user_id.eq(user_id))
            .get_result::<UserGamification>(self.db_conn)
            .optional()
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(try err e, ErrorSource::Diesel, error_kind => user_id)
            })?;

        if let Some(ref state) = state {
            acl::check(&*self.acl, Resource::Gamification, Action::Read, self, Some(state))
                .map_err(ectx!(try ErrorKind::Forbidden => user_id))?;
        }

        Ok(state)
    }

    fn add_points(&self, user_id: UserId, points: i32) -> RepoResult<UserGamification> {
        debug!("Adding {} points to user {}", points, user_id);
        self.check_write(user_id)?;

        self.db_conn.transaction::<UserGamification, Error, _>(|| {
            let current = UserGamifications::user_gamification
                .filter(UserGamifications::user_id.eq(user_id))
                .for_update()
                .get_result::<UserGamification>(self.db_conn)
                .optional()
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(try err e, ErrorSource::Diesel, error_kind => user_id)
                })?;

            let total = current.map(|state| state.points).unwrap_or(0).saturating_add(points);
            let payload = UserGamification {
                user_id,
                points: total,
                level: level_for_points(total),
                updated_at: Utc::now().naive_utc(),
            };

            diesel::insert_into(UserGamifications::user_gamification)
                .values(&payload)
                .on_conflict(UserGamifications::user_id)
                .do_update()
                .set((
                    UserGamifications::points.eq(excluded(UserGamifications::points)),
                    UserGamifications::level.eq(excluded(UserGamifications::level)),
                    UserGamifications::updated_at.eq(excluded(UserGamifications::updated_at)),
                ))
                .get_result::<UserGamification>(self.db_conn)
                .map_err(|e| {
                    let error_kind = ErrorKind::from(&e);
                    ectx!(err e, ErrorSource::Diesel, error_kind => payload)
                })
        })
    }

    fn list_badges(&self) -> RepoResult<Vec<Badge>> {
        debug!("Listing badges");

        Badges::badges
            .order(Badges::points_required.asc())
            .get_results::<Badge>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind)
            })
    }

    fn user_badges(&self, user_id: UserId) -> RepoResult<Vec<Badge>> {
        debug!("Listing badges of user {}", user_id);

        UserBadges::user_badges
            .inner_join(Badges::badges)
            .filter(UserBadges::user_id.eq(user_id))
            .select(badges::all_columns)
            .order(UserBadges::awarded_at.asc())
            .get_results::<Badge>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => user_id)
            })
    }

    fn award_badges(&self, user_id: UserId, badge_ids: Vec<BadgeId>) -> RepoResult<Vec<UserBadge>> {
        debug!("Awarding badges {:?} to user {}", badge_ids, user_id);
        self.check_write(user_id)?;
        if badge_ids.is_empty() {
            return Ok(vec![]);
        }

        let now = Utc::now().naive_utc();
        let payload = badge_ids
            .iter()
            .map(|badge_id| UserBadge {
                user_id,
                badge_id: *badge_id,
                awarded_at: now,
            })
            .collect::<Vec<_>>();

        diesel::insert_into(UserBadges::user_badges)
            .values(&payload)
            .on_conflict((UserBadges::user_id, UserBadges::badge_id))
            .do_nothing()
            .get_results::<UserBadge>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => user_id, badge_ids)
            })
    }

    fn list_missions(&self, kind: Option<MissionKind>) -> RepoResult<Vec<Mission>> {
        debug!("Listing missions of kind {:?}", kind);

        let mut query = Missions::missions.into_boxed();
        if let Some(kind) = kind {
            query = query.filter(Missions::kind.eq(kind));
        }

        query
            .order(Missions::target.asc())
            .get_results::<Mission>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => kind)
            })
    }

    fn user_missions(&self, user_id: UserId) -> RepoResult<Vec<UserMission>> {
        debug!("Listing missions of user {}", user_id);

        UserMissions::user_missions
            .inner_join(Missions::missions)
            .filter(UserMissions::user_id.eq(user_id))
            .select((
                UserMissions::user_id,
                UserMissions::mission_id,
                UserMissions::progress,
                UserMissions::completed_at,
            ))
            .order(missions::target.asc())
            .get_results::<UserMission>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => user_id)
            })
    }

    fn save_mission_progress(&self, payload: UserMission) -> RepoResult<UserMission> {
        debug!("Saving progress of mission {} for user {}", payload.mission_id, payload.user_id);
        self.check_write(payload.user_id)?;

        diesel::insert_into(UserMissions::user_missions)
            .values(&payload)
            .on_conflict((UserMissions::user_id, UserMissions::mission_id))
            .do_update()
            .set((
                UserMissions::progress.eq(excluded(UserMissions::progress)),
                UserMissions::completed_at.eq(excluded(UserMissions::completed_at)),
            ))
            .get_result::<UserMission>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => payload)
            })
    }

    fn leaderboard(&self, limit: i64) -> RepoResult<Vec<LeaderboardEntry>> {
        debug!("Getting leaderboard, limit {}", limit);

        UserGamifications::user_gamification
            .inner_join(Users::users)
            .select((
                UserGamifications::user_id,
                Users::name,
                UserGamifications::points,
                UserGamifications::level,
            ))
            .order((UserGamifications::points.desc(), UserGamifications::updated_at.asc()))
            .limit(limit)
            .get_results::<LeaderboardEntry>(self.db_conn)
            .map_err(|e| {
                let error_kind = ErrorKind::from(&e);
                ectx!(err e, ErrorSource::Diesel, error_kind => limit)
            })
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> CheckScope<UserGamification>
    for GamificationRepoImpl<'a, T>
{
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&UserGamification>) -> bool {
        match *scope {
            Scope::All => true,
            Scope::Owned => obj.map(|state| state.user_id == user_id).unwrap_or(false),
        }
    }
}
