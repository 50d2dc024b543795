//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Every tenant
//! scoped table carries `organization_id`; `users` is global.

diesel::table! {
    /// Tenants.
    organizations (id) {
        id -> Uuid,
        name -> Varchar,
        subdomain -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Global identities. `email` may sit on the internal facade domain.
    users (id) {
        id -> Uuid,
        display_name -> Varchar,
        email -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Machine catalogue rows the core reads for ownership.
    machines (id) {
        id -> Uuid,
        organization_id -> Uuid,
        name -> Varchar,
        owner_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    /// Named permission bundles, unique by name within an organization.
    roles (id) {
        id -> Uuid,
        organization_id -> Uuid,
        name -> Varchar,
        is_system -> Bool,
        is_default -> Bool,
    }
}

diesel::table! {
    /// One row per capability granted by a role.
    role_permissions (role_id, permission) {
        role_id -> Uuid,
        permission -> Varchar,
    }
}

diesel::table! {
    /// Unique per (user, organization).
    memberships (user_id, organization_id) {
        user_id -> Uuid,
        organization_id -> Uuid,
        role_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    issues (id) {
        id -> Uuid,
        organization_id -> Uuid,
        machine_id -> Uuid,
        title -> Varchar,
        status -> Varchar,
        priority -> Varchar,
        severity -> Varchar,
        created_by -> Nullable<Uuid>,
        assigned_to -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    comments (id) {
        id -> Uuid,
        organization_id -> Uuid,
        issue_id -> Uuid,
        author_id -> Uuid,
        body -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Subscriptions keyed by (issue, user); `reasons` is a bit set.
    watchers (issue_id, user_id) {
        issue_id -> Uuid,
        user_id -> Uuid,
        organization_id -> Uuid,
        reasons -> Int2,
    }
}

diesel::table! {
    /// Per-user, per-organization toggles. `categories` holds the channel
    /// matrix as JSON.
    notification_preferences (user_id, organization_id) {
        user_id -> Uuid,
        organization_id -> Uuid,
        email_enabled -> Bool,
        auto_watch_created -> Bool,
        auto_watch_owned_machines -> Bool,
        new_issue_watch -> Bool,
        categories -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// In-app delivery records; `id` is derived from (event, recipient).
    notifications (id) {
        id -> Uuid,
        organization_id -> Uuid,
        recipient_id -> Uuid,
        event_id -> Uuid,
        category -> Varchar,
        message -> Text,
        link -> Varchar,
        read_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(machines -> organizations (organization_id));
diesel::joinable!(roles -> organizations (organization_id));
diesel::joinable!(role_permissions -> roles (role_id));
diesel::joinable!(memberships -> roles (role_id));
diesel::joinable!(memberships -> users (user_id));
diesel::joinable!(issues -> machines (machine_id));
diesel::joinable!(comments -> issues (issue_id));
diesel::joinable!(watchers -> issues (issue_id));

diesel::allow_tables_to_appear_in_same_query!(
    organizations,
    users,
    machines,
    roles,
    role_permissions,
    memberships,
    issues,
    comments,
    watchers,
    notification_preferences,
    notifications,
);
