table! {
    users (id) {
        id -> Uuid,
        email -> VarChar,
        password_hash -> VarChar,
        name -> VarChar,
        role -> VarChar,
        status -> VarChar,
        pix_key -> Nullable<VarChar>,
        bank_name -> Nullable<VarChar>,
        bank_agency -> Nullable<VarChar>,
        bank_account -> Nullable<VarChar>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    products (id) {
        id -> Uuid,
        producer_id -> Uuid,
        title -> VarChar,
        description -> Text,
        kind -> VarChar,
        price -> BigInt,
        status -> VarChar,
        rejection_reason -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    orders (id) {
        id -> Uuid,
        checkout_id -> Uuid,
        buyer_id -> Uuid,
        producer_id -> Uuid,
        product_id -> Nullable<Uuid>,
        combo_id -> Nullable<Uuid>,
        order_bump_id -> Nullable<Uuid>,
        amount -> BigInt,
        platform_fee -> BigInt,
        producer_amount -> BigInt,
        rate_bps -> Integer,
        status -> VarChar,
        payment_status -> VarChar,
        payment_id -> Nullable<VarChar>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    commissions (id) {
        id -> Uuid,
        order_id -> Uuid,
        producer_id -> Uuid,
        amount -> BigInt,
        rate_bps -> Integer,
        status -> VarChar,
        created_at -> Timestamp,
        paid_at -> Nullable<Timestamp>,
    }
}

table! {
    combos (id) {
        id -> Uuid,
        producer_id -> Uuid,
        title -> VarChar,
        description -> Text,
        price -> BigInt,
        active -> Bool,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    combo_products (combo_id, product_id) {
        combo_id -> Uuid,
        product_id -> Uuid,
    }
}

table! {
    cart_items (id) {
        id -> Uuid,
        user_id -> Uuid,
        product_id -> Uuid,
        created_at -> Timestamp,
    }
}

table! {
    order_bumps (id) {
        id -> Uuid,
        product_id -> Uuid,
        offer_product_id -> Uuid,
        producer_id -> Uuid,
        headline -> VarChar,
        price -> BigInt,
        active -> Bool,
        created_at -> Timestamp,
    }
}

table! {
    apps (id) {
        id -> Uuid,
        producer_id -> Uuid,
        name -> VarChar,
        description -> Text,
        platform -> VarChar,
        download_url -> VarChar,
        price -> BigInt,
        status -> VarChar,
        rejection_reason -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    badges (id) {
        id -> Uuid,
        code -> VarChar,
        name -> VarChar,
        description -> Text,
        points_required -> Integer,
    }
}

table! {
    missions (id) {
        id -> Uuid,
        code -> VarChar,
        title -> VarChar,
        description -> Text,
        kind -> VarChar,
        target -> Integer,
        reward_points -> Integer,
    }
}

table! {
    user_gamification (user_id) {
        user_id -> Uuid,
        points -> Integer,
        level -> Integer,
        updated_at -> Timestamp,
    }
}

table! {
    user_badges (user_id, badge_id) {
        user_id -> Uuid,
        badge_id -> Uuid,
        awarded_at -> Timestamp,
    }
}

table! {
    user_missions (user_id, mission_id) {
        user_id -> Uuid,
        mission_id -> Uuid,
        progress -> Integer,
        completed_at -> Nullable<Timestamp>,
    }
}

joinable!(commissions -> orders (order_id));
joinable!(user_badges -> badges (badge_id));
joinable!(user_missions -> missions (mission_id));
joinable!(user_gamification -> users (user_id));

allow_tables_to_appear_in_same_query!(
    users,
    products,
    orders,
    commissions,
    combos,
    combo_products,
    cart_items,
    order_bumps,
    apps,
    badges,
    missions,
    user_gamification,
    user_badges,
    user_missions,
);
