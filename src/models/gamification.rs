//! Points, levels, badges and missions

use chrono::NaiveDateTime;
use diesel::sql_types::VarChar;

use crate::models::{Amount, UserId};
use crate::schema::{user_badges, user_gamification, user_missions};

uuid_id!(BadgeId, badge_id_sql);
uuid_id!(MissionId, mission_id_sql);

/// Points needed per level step, level `L` starts at `LEVEL_STEP * L * (L - 1) / 2`
pub const LEVEL_STEP: i64 = 100;

/// Level reached with `points`, starting from level 1.
pub fn level_for_points(points: i32) -> i32 {
    if points <= 0 {
        return 1;
    }
    let points = i64::from(points);
    let mut level: i64 = 1;
    while points_for_level(level + 1) <= points {
        level += 1;
    }
    level as i32
}

/// Minimal amount of points for `level`
pub fn points_for_level(level: i64) -> i64 {
    LEVEL_STEP * level * (level - 1) / 2
}

/// One point per whole real spent
pub fn points_for_purchase(amount: Amount) -> i32 {
    let reais = amount.whole_reais();
    if reais > i32::max_value() as u64 {
        i32::max_value()
    } else {
        reais as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromSqlRow, AsExpression)]
#[sql_type = "VarChar"]
#[serde(rename_all = "lowercase")]
pub enum MissionKind {
    /// Buyer completed a purchase
    Purchase,
    /// Producer sold something
    Sale,
    /// Producer got a listing published
    Publish,
}

derive_varchar_enum!(MissionKind, ParseMissionKindError, {
    Purchase => "purchase",
    Sale => "sale",
    Publish => "publish",
});

#[derive(Clone, Debug, Serialize, Queryable)]
pub struct Badge {
    pub id: BadgeId,
    pub code: String,
    pub name: String,
    pub description: String,
    pub points_required: i32,
}

#[derive(Clone, Debug, Serialize, Queryable)]
pub struct Mission {
    pub id: MissionId,
    pub code: String,
    pub title: String,
    pub description: String,
    pub kind: MissionKind,
    pub target: i32,
    pub reward_points: i32,
}

#[derive(Clone, Debug, Serialize, Queryable, Insertable)]
#[table_name = "user_gamification"]
pub struct UserGamification {
    pub user_id: UserId,
    pub points: i32,
    pub level: i32,
    pub updated_at: NaiveDateTime,
}

#[derive(Clone, Debug, Serialize, Queryable, Insertable)]
#[table_name = "user_badges"]
pub struct UserBadge {
    pub user_id: UserId,
    pub badge_id: BadgeId,
    pub awarded_at: NaiveDateTime,
}

#[derive(Clone, Debug, Serialize, Queryable, Insertable)]
#[table_name = "user_missions"]
pub struct UserMission {
    pub user_id: UserId,
    pub mission_id: MissionId,
    pub progress: i32,
    pub completed_at: Option<NaiveDateTime>,
}

impl UserMission {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Something that happened to a user and moves gamification forward
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GamificationEvent {
    Purchase { buyer_id: UserId, amount: Amount },
    Sale { producer_id: UserId },
    Publish { producer_id: UserId },
}

impl GamificationEvent {
    pub fn user_id(&self) -> UserId {
        match *self {
            GamificationEvent::Purchase { buyer_id, .. } => buyer_id,
            GamificationEvent::Sale { producer_id } => producer_id,
            GamificationEvent::Publish { producer_id } => producer_id,
        }
    }

    pub fn mission_kind(&self) -> MissionKind {
        match *self {
            GamificationEvent::Purchase { .. } => MissionKind::Purchase,
            GamificationEvent::Sale { .. } => MissionKind::Sale,
            GamificationEvent::Publish { .. } => MissionKind::Publish,
        }
    }

    /// Points granted by the event itself, mission rewards come on top
    pub fn points(&self) -> i32 {
        match *self {
            GamificationEvent::Purchase { amount, .. } => points_for_purchase(amount),
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MissionProgress {
    #[serde(flatten)]
    pub mission: Mission,
    pub progress: i32,
    pub completed: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct GamificationProfile {
    pub user_id: UserId,
    pub points: i32,
    pub level: i32,
    pub next_level_points: i64,
    pub badges: Vec<Badge>,
    pub missions: Vec<MissionProgress>,
}

#[derive(Clone, Debug, Serialize, Queryable)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub name: String,
    pub points: i32,
    pub level: i32,
}
