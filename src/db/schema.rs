table! {
    languages (id) {
        id -> Integer,
        code -> Text,
        name -> Text,
    }
}

table! {
    service_packs (id) {
        id -> Integer,
        code -> Text,
        name -> Text,
    }
}

table! {
    server_roles (id) {
        id -> Integer,
        name -> Text,
    }
}

table! {
    platforms (id) {
        id -> Integer,
        name -> Text,
    }
}

table! {
    components (id) {
        id -> Integer,
        code -> Text,
        name -> Text,
    }
}

table! {
    modules (id) {
        id -> Integer,
        name -> Text,
    }
}

table! {
    clients (id) {
        id -> Integer,
        client_name -> Text,
        contact_status -> Bool,
        language_id -> Nullable<Integer>,
        saas -> Bool,
        service_pack_id -> Nullable<Integer>,
        server_version -> Nullable<Text>,
        supports_ipad -> Bool,
        supports_android -> Bool,
    }
}

table! {
    client_modules (id) {
        id -> Integer,
        client_id -> Integer,
        module_id -> Integer,
        is_active -> Bool,
    }
}

table! {
    contacts (id) {
        id -> Integer,
        client_id -> Integer,
        first_name -> Text,
        last_name -> Text,
        email -> Text,
        phone_number -> Text,
        notification_update -> Bool,
    }
}

table! {
    users (id) {
        id -> Integer,
        username -> Text,
        password_hash -> Text,
    }
}

table! {
    mailings (id) {
        id -> Integer,
        mode -> Text,
        mailing_type -> Text,
        release_type -> Text,
        server_version -> Text,
        ipad_version -> Text,
        android_version -> Text,
        service_window -> Bool,
        saas_notification -> Bool,
        saas_update_time -> Nullable<Timestamp>,
        module_id -> Nullable<Integer>,
        status -> Text,
        language -> Nullable<Text>,
        recipients_generated -> Bool,
        created_at -> Timestamp,
        started_at -> Nullable<Timestamp>,
        completed_at -> Nullable<Timestamp>,
        error_message -> Nullable<Text>,
    }
}

table! {
    mailing_components (mailing_id, component_id) {
        mailing_id -> Integer,
        component_id -> Integer,
    }
}

table! {
    mailing_recipients (id) {
        id -> Integer,
        mailing_id -> Integer,
        client_id -> Integer,
        email -> Text,
        language -> Text,
        status -> Text,
        error_message -> Nullable<Text>,
        sent_at -> Nullable<Timestamp>,
    }
}

table! {
    mailing_test_recipients (id) {
        id -> Integer,
        mailing_id -> Integer,
        email -> Text,
        status -> Text,
        error_message -> Nullable<Text>,
        sent_at -> Nullable<Timestamp>,
    }
}

table! {
    mailing_logs (id) {
        id -> Integer,
        mailing_id -> Integer,
        logged_at -> Timestamp,
        level -> Text,
        message -> Text,
    }
}

joinable!(clients -> languages (language_id));
joinable!(clients -> service_packs (service_pack_id));
joinable!(client_modules -> clients (client_id));
joinable!(client_modules -> modules (module_id));
joinable!(contacts -> clients (client_id));
joinable!(mailings -> modules (module_id));
joinable!(mailing_components -> mailings (mailing_id));
joinable!(mailing_components -> components (component_id));
joinable!(mailing_recipients -> mailings (mailing_id));
joinable!(mailing_recipients -> clients (client_id));
joinable!(mailing_test_recipients -> mailings (mailing_id));
joinable!(mailing_logs -> mailings (mailing_id));

allow_tables_to_appear_in_same_query!(
    languages,
    service_packs,
    server_roles,
    platforms,
    components,
    modules,
    clients,
    client_modules,
    contacts,
    users,
    mailings,
    mailing_components,
    mailing_recipients,
    mailing_test_recipients,
    mailing_logs,
);
