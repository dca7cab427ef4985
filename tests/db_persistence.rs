#[cfg(test)]
mod tests {
    use chatledger::config::DatabaseConfig;
    use chatledger::context::ContextMetrics;
    use chatledger::db::{connection, with_transaction, Conversation, DbService, Folder, FolderFilter, Message, SortOrder, User};
    use chatledger::llm::models::{Provider, Role};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn get_test_db() -> duckdb::Connection {
        let config = DatabaseConfig {
            path: ":memory:".to_string(),
        };
        let pool = connection::get_connection(&config).unwrap();
        // A single-connection pool; take the connection back out of it.
        std::sync::Arc::try_unwrap(pool).ok().unwrap().into_inner().unwrap()
    }

    fn user(conn: &duckdb::Connection, email: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            created_at: Utc::now(),
        };
        DbService::insert_user(conn, &user, &format!("digest-{email}")).unwrap();
        user
    }

    fn conversation(user_id: Uuid, folder_id: Option<Uuid>, minutes_ago: i64) -> Conversation {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        Conversation {
            id: Uuid::new_v4(),
            user_id,
            title: format!("{minutes_ago} minutes ago"),
            provider: Provider::OpenAi,
            model_name: "gpt-4o-mini".to_string(),
            message_count: 0,
            total_tokens_used: 0,
            metrics: ContextMetrics {
                total_context_size: 128_000,
                remaining_context_size: 128_000,
                total_used_percentage: 0.0,
                remaining_percentage: 100.0,
            },
            folder_id,
            version: 0,
            created_at: at,
            updated_at: at,
        }
    }

    fn message(conversation: &Conversation, role: Role, sequence_number: i64, tokens_used: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            user_id: conversation.user_id,
            role,
            content: format!("message {sequence_number}"),
            tokens_used,
            sequence_number,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_lookup_and_api_keys() {
        let conn = get_test_db();
        let stored = user(&conn, "grace@navy.mil");

        let by_email = DbService::find_user_by_email(&conn, "GRACE@navy.mil").unwrap().unwrap();
        assert_eq!(by_email.id, stored.id);
        let by_token = DbService::find_user_by_token(&conn, "digest-grace@navy.mil").unwrap().unwrap();
        assert_eq!(by_token.id, stored.id);
        assert!(DbService::find_user_by_token(&conn, "nope").unwrap().is_none());

        DbService::set_api_key(&conn, stored.id, Provider::Anthropic, Some("ciphertext")).unwrap();
        let keys = DbService::get_api_keys(&conn, stored.id).unwrap().unwrap();
        assert_eq!(keys.get(Provider::Anthropic), Some("ciphertext"));
        assert_eq!(keys.get(Provider::OpenAi), None);

        DbService::set_api_key(&conn, stored.id, Provider::Anthropic, None).unwrap();
        let keys = DbService::get_api_keys(&conn, stored.id).unwrap().unwrap();
        assert_eq!(keys.get(Provider::Anthropic), None);
    }

    #[test]
    fn test_conversation_lifecycle() {
        let conn = get_test_db();
        let owner = user(&conn, "owner@test.io");

        // 1. Insert and fetch
        let mut conv = conversation(owner.id, None, 0);
        DbService::insert_conversation(&conn, &conv).unwrap();
        let fetched = DbService::get_conversation(&conn, conv.id).unwrap().unwrap();
        assert_eq!(fetched.title, conv.title);
        assert_eq!(fetched.provider, Provider::OpenAi);
        assert_eq!(fetched.metrics, conv.metrics);
        assert_eq!(fetched.created_at.timestamp_micros(), conv.created_at.timestamp_micros());

        // 2. Versioned update
        conv.title = "Renamed".to_string();
        conv.total_tokens_used = 1280;
        assert!(DbService::update_conversation(&conn, &conv).unwrap());
        let fetched = DbService::get_conversation(&conn, conv.id).unwrap().unwrap();
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.total_tokens_used, 1280);

        // 3. A stale version loses
        conv.title = "Lost update".to_string();
        assert!(!DbService::update_conversation(&conn, &conv).unwrap());
        let fetched = DbService::get_conversation(&conn, conv.id).unwrap().unwrap();
        assert_eq!(fetched.title, "Renamed");

        // 4. Delete
        assert_eq!(DbService::delete_conversation(&conn, conv.id).unwrap(), 1);
        assert!(DbService::get_conversation(&conn, conv.id).unwrap().is_none());
    }

    #[test]
    fn test_conversation_listing_order_and_folder_filter() {
        let conn = get_test_db();
        let owner = user(&conn, "list@test.io");
        let folder_id = Uuid::new_v4();

        let oldest = conversation(owner.id, None, 30);
        let middle = conversation(owner.id, Some(folder_id), 20);
        let newest = conversation(owner.id, None, 10);
        for c in [&middle, &oldest, &newest] {
            DbService::insert_conversation(&conn, c).unwrap();
        }
        // Someone else's conversation never shows up.
        DbService::insert_conversation(&conn, &conversation(Uuid::new_v4(), None, 0)).unwrap();

        let all = DbService::list_conversations(&conn, owner.id, FolderFilter::Any, 0, 50).unwrap();
        let ids: Vec<Uuid> = all.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![newest.id, middle.id, oldest.id]);

        let unfiled = DbService::list_conversations(&conn, owner.id, FolderFilter::Unfiled, 0, 50).unwrap();
        assert_eq!(unfiled.iter().map(|c| c.id).collect::<Vec<_>>(), vec![newest.id, oldest.id]);

        let filed = DbService::list_conversations(&conn, owner.id, FolderFilter::In(folder_id), 0, 50).unwrap();
        assert_eq!(filed.len(), 1);
        assert_eq!(DbService::count_conversations_in_folder(&conn, folder_id).unwrap(), 1);

        let second_page = DbService::list_conversations(&conn, owner.id, FolderFilter::Any, 1, 1).unwrap();
        assert_eq!(second_page[0].id, middle.id);
    }

    #[test]
    fn test_messages_sequence_and_gap_closing() {
        let conn = get_test_db();
        let owner = user(&conn, "msgs@test.io");
        let conv = conversation(owner.id, None, 0);
        DbService::insert_conversation(&conn, &conv).unwrap();

        let messages: Vec<Message> = (0..4)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                message(&conv, role, i, 10 * (i + 1))
            })
            .collect();
        for m in &messages {
            DbService::insert_message(&conn, m).unwrap();
        }

        assert_eq!(DbService::count_messages(&conn, conv.id).unwrap(), 4);
        assert_eq!(DbService::sum_message_tokens(&conn, conv.id).unwrap(), 100);

        let desc = DbService::list_messages(&conn, conv.id, SortOrder::Desc, 0, 2).unwrap();
        assert_eq!(desc.iter().map(|m| m.sequence_number).collect::<Vec<_>>(), vec![3, 2]);

        // Remove sequence 1 and shift the tail down inside one transaction.
        with_transaction(&conn, |tx| -> duckdb::Result<()> {
            DbService::delete_message(tx, messages[1].id)?;
            DbService::close_sequence_gap(tx, conv.id, 1)?;
            Ok(())
        })
        .unwrap();

        let history = DbService::conversation_history(&conn, conv.id).unwrap();
        assert_eq!(history.iter().map(|m| m.sequence_number).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(history[1].id, messages[2].id);

        DbService::update_message_content(&conn, messages[0].id, "edited").unwrap();
        let edited = DbService::get_message(&conn, messages[0].id).unwrap().unwrap();
        assert_eq!(edited.content, "edited");
        assert_eq!(edited.role, Role::User);

        assert_eq!(DbService::delete_messages_for_conversation(&conn, conv.id).unwrap(), 3);
        assert_eq!(DbService::sum_message_tokens(&conn, conv.id).unwrap(), 0);
    }

    #[test]
    fn test_api_key_changes_roll_back_together() {
        let conn = get_test_db();
        let stored = user(&conn, "keys@test.io");
        DbService::set_api_key(&conn, stored.id, Provider::Google, Some("old-google")).unwrap();

        let result = with_transaction(&conn, |tx| -> duckdb::Result<()> {
            DbService::set_api_key(tx, stored.id, Provider::OpenAi, Some("new-openai"))?;
            DbService::set_api_key(tx, stored.id, Provider::Google, None)?;
            Err(duckdb::Error::QueryReturnedNoRows)
        });
        assert!(result.is_err());

        let keys = DbService::get_api_keys(&conn, stored.id).unwrap().unwrap();
        assert_eq!(keys.get(Provider::OpenAi), None);
        assert_eq!(keys.get(Provider::Google), Some("old-google"));
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let conn = get_test_db();
        let owner = user(&conn, "tx@test.io");
        let conv = conversation(owner.id, None, 0);

        let result = with_transaction(&conn, |tx| -> duckdb::Result<()> {
            DbService::insert_conversation(tx, &conv)?;
            // Same primary key twice.
            DbService::insert_conversation(tx, &conv)?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(DbService::get_conversation(&conn, conv.id).unwrap().is_none());
    }

    #[test]
    fn test_folder_name_lookup_is_case_insensitive() {
        let conn = get_test_db();
        let owner = user(&conn, "folders@test.io");
        let now = Utc::now();
        let folder = Folder {
            id: Uuid::new_v4(),
            user_id: owner.id,
            name: "Reading List".to_string(),
            created_at: now,
            updated_at: now,
        };
        DbService::insert_folder(&conn, &folder).unwrap();

        assert!(DbService::find_folder_by_name(&conn, owner.id, "reading list", None).unwrap().is_some());
        assert!(DbService::find_folder_by_name(&conn, owner.id, "reading list", Some(folder.id))
            .unwrap()
            .is_none());
        assert!(DbService::find_folder_by_name(&conn, Uuid::new_v4(), "Reading List", None)
            .unwrap()
            .is_none());

        DbService::rename_folder(&conn, folder.id, "Later", Utc::now()).unwrap();
        assert_eq!(DbService::get_folder(&conn, folder.id).unwrap().unwrap().name, "Later");
        assert_eq!(DbService::list_folders(&conn, owner.id, 0, 10).unwrap().len(), 1);

        DbService::delete_folder(&conn, folder.id).unwrap();
        assert!(DbService::get_folder(&conn, folder.id).unwrap().is_none());
    }
}
