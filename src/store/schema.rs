table! {
    files (id) {
        id -> BigInt,
        path -> Text,
        created -> Timestamp,
        modified -> Timestamp,
        user_id -> Integer,
        was_deleted -> Bool,
    }
}

table! {
    file_id_lookups (duplicate_file_id) {
        duplicate_file_id -> BigInt,
        existing_file_id -> BigInt,
    }
}

table! {
    histories (id) {
        id -> BigInt,
        file_id -> BigInt,
        operation -> Text,
        modified -> Timestamp,
        user_id -> Integer,
        data -> Nullable<Text>,
    }
}

table! {
    handled_events (id) {
        id -> BigInt,
        created -> Timestamp,
        username -> Text,
    }
}

table! {
    users (id) {
        id -> Integer,
        username -> Text,
    }
}

table! {
    assets (id) {
        id -> BigInt,

        file_id -> BigInt,
        path -> Text,
        name -> Text,

        file_type_id -> BigInt,
        engine_type_id -> BigInt,
        rcs_user_id -> BigInt,
        rcs_revision -> BigInt,
        size -> BigInt,

        last_updated -> Timestamp,
    }
}

table! {
    file_types (id) {
        id -> BigInt,
        name -> Text,
    }
}

table! {
    engine_types (id) {
        id -> BigInt,
        name -> Text,
    }
}

table! {
    rcs_users (id) {
        id -> BigInt,
        username -> Text,
    }
}

table! {
    asset_usages (asset_id, dependency_id) {
        asset_id -> BigInt,
        dependency_id -> BigInt,
    }
}

table! {
    entities_x_shaders (entity_id, shader_id) {
        entity_id -> BigInt,
        shader_id -> BigInt,
    }
}

table! {
    levels_x_entities (level_id, entity_id) {
        level_id -> BigInt,
        entity_id -> BigInt,
    }
}

table! {
    attributes (id) {
        id -> BigInt,
        name -> Text,
    }
}

table! {
    asset_x_attributes (asset_id, attribute_id) {
        asset_id -> BigInt,
        attribute_id -> BigInt,
        value -> Nullable<Text>,
    }
}

allow_tables_to_appear_in_same_query!(
    files,
    file_id_lookups,
    histories,
    users,
    assets,
    file_types,
    engine_types,
    rcs_users,
    asset_usages,
    entities_x_shaders,
    levels_x_entities,
    attributes,
    asset_x_attributes,
);
