use rusqlite::Connection;

/// Initialize the main database schema (everything except audit logs)
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Companies (tenants). Every other row is scoped to one company.
        -- Soft delete: deleted_at = timestamp when deleted, NULL = active
        CREATE TABLE IF NOT EXISTS companies (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            plan TEXT NOT NULL DEFAULT 'free' CHECK (plan IN ('free', 'starter', 'pro')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_companies_active ON companies(id) WHERE deleted_at IS NULL;

        -- Sellers (team members; the authenticated principals)
        CREATE TABLE IF NOT EXISTS sellers (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            role TEXT NOT NULL CHECK (role IN ('owner', 'manager', 'seller')),
            api_key_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_sellers_company ON sellers(company_id);
        CREATE INDEX IF NOT EXISTS idx_sellers_key_hash ON sellers(api_key_hash);
        -- Emails unique among active sellers only; a deactivated seller's
        -- email can be reused.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sellers_email_unique ON sellers(company_id, email) WHERE deleted_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_sellers_active ON sellers(id) WHERE deleted_at IS NULL;

        -- Deals (CRM pipeline)
        -- closed_at is set exactly when the stage is terminal (won/lost);
        -- metas and rankings aggregate over it.
        CREATE TABLE IF NOT EXISTS deals (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
            seller_id TEXT NOT NULL REFERENCES sellers(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            customer_email TEXT,
            customer_phone TEXT,
            value_cents INTEGER NOT NULL CHECK (value_cents >= 0),
            stage TEXT NOT NULL DEFAULT 'lead' CHECK (stage IN ('lead', 'qualified', 'proposal', 'negotiation', 'won', 'lost')),
            expected_close_at INTEGER,
            notes TEXT,
            loss_reason TEXT,
            closed_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            CHECK ((closed_at IS NOT NULL) = (stage IN ('won', 'lost')))
        );
        CREATE INDEX IF NOT EXISTS idx_deals_company_stage ON deals(company_id, stage);
        CREATE INDEX IF NOT EXISTS idx_deals_seller ON deals(seller_id);
        CREATE INDEX IF NOT EXISTS idx_deals_company_closed ON deals(company_id, closed_at) WHERE closed_at IS NOT NULL;

        -- Metas (monthly goals; seller_id NULL = company-wide)
        CREATE TABLE IF NOT EXISTS metas (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
            seller_id TEXT REFERENCES sellers(id) ON DELETE CASCADE,
            period TEXT NOT NULL,
            target_value_cents INTEGER NOT NULL CHECK (target_value_cents >= 0),
            target_deals INTEGER NOT NULL CHECK (target_deals >= 0),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        -- One meta per seller per period, one company-wide meta per period
        CREATE UNIQUE INDEX IF NOT EXISTS idx_metas_seller_unique ON metas(company_id, seller_id, period) WHERE seller_id IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_metas_company_unique ON metas(company_id, period) WHERE seller_id IS NULL;
        CREATE INDEX IF NOT EXISTS idx_metas_period ON metas(company_id, period);

        -- Agendamentos (scheduled calls)
        -- calendar_pending marks rows whose latest change has not reached
        -- Google yet; the background sweep retries them.
        CREATE TABLE IF NOT EXISTS agendamentos (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
            seller_id TEXT NOT NULL REFERENCES sellers(id) ON DELETE CASCADE,
            deal_id TEXT REFERENCES deals(id) ON DELETE SET NULL,
            customer_name TEXT NOT NULL,
            customer_phone TEXT,
            scheduled_at INTEGER NOT NULL,
            duration_min INTEGER NOT NULL DEFAULT 30 CHECK (duration_min > 0),
            status TEXT NOT NULL DEFAULT 'scheduled' CHECK (status IN ('scheduled', 'completed', 'no_show', 'cancelled')),
            notes TEXT,
            google_event_id TEXT,
            calendar_pending INTEGER NOT NULL DEFAULT 0,
            reminder_sent INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_agendamentos_company_time ON agendamentos(company_id, scheduled_at);
        CREATE INDEX IF NOT EXISTS idx_agendamentos_seller ON agendamentos(seller_id);
        CREATE INDEX IF NOT EXISTS idx_agendamentos_reminder_scan ON agendamentos(status, reminder_sent, scheduled_at);
        CREATE INDEX IF NOT EXISTS idx_agendamentos_calendar_pending ON agendamentos(seller_id) WHERE calendar_pending = 1;

        -- Calendar accounts (one Google connection per seller; tokens are
        -- envelope-encrypted blobs)
        CREATE TABLE IF NOT EXISTS calendar_accounts (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL UNIQUE REFERENCES sellers(id) ON DELETE CASCADE,
            google_email TEXT NOT NULL,
            access_token BLOB NOT NULL,
            refresh_token BLOB NOT NULL,
            token_expires_at INTEGER NOT NULL,
            calendar_id TEXT NOT NULL DEFAULT 'primary',
            connected_at INTEGER NOT NULL,
            last_synced_at INTEGER
        );

        -- OAuth states (single-use CSRF tokens for the consent flow)
        CREATE TABLE IF NOT EXISTS oauth_states (
            state TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL REFERENCES sellers(id) ON DELETE CASCADE,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_oauth_states_expires ON oauth_states(expires_at);

        -- Subscriptions (one live row per company; preapproval id is the
        -- webhook's lookup key)
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
            plan TEXT NOT NULL CHECK (plan IN ('starter', 'pro')),
            status TEXT NOT NULL CHECK (status IN ('pending', 'active', 'past_due', 'cancelled')),
            mp_preapproval_id TEXT NOT NULL UNIQUE,
            paid_through INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_company ON subscriptions(company_id);

        -- Webhook events (for replay attack prevention)
        CREATE TABLE IF NOT EXISTS webhook_events (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(provider, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_lookup ON webhook_events(provider, event_id);
        "#,
    )?;
    Ok(())
}

/// Initialize the audit log database schema (separate DB file)
/// Optimized for append-only workload with WAL mode
pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    // WAL mode: writes are sequential appends, much faster for append-only workloads
    // synchronous=NORMAL: safe with WAL, faster than FULL
    // journal_size_limit: prevent WAL from growing indefinitely
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 1000;
        PRAGMA journal_size_limit = 67108864;

        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_type TEXT NOT NULL CHECK (actor_type IN ('seller', 'public', 'system')),
            actor_id TEXT,                        -- references sellers.id (null for public/system)
            actor_name TEXT,                      -- denormalized for query convenience
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            resource_name TEXT,
            details TEXT,
            company_id TEXT,
            company_name TEXT,
            ip_address TEXT,
            user_agent TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_company_time ON audit_logs(company_id, timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_resource ON audit_logs(resource_type, resource_id);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_actor ON audit_logs(actor_id);
        "#,
    )?;
    Ok(())
}
