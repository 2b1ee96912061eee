//! SQLite schema definition

/// SQL schema for the form database
pub const SCHEMA_SQL: &str = r#"
-- Users: callers resolved by the host application
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL CHECK (role IN ('admin', 'editor', 'viewer')),
    created_at TEXT NOT NULL
);

-- Forms: one row per schema version
CREATE TABLE IF NOT EXISTS forms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    fields_json TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('draft', 'active', 'archived')),
    version INTEGER NOT NULL CHECK (version >= 1),
    original_form_id INTEGER REFERENCES forms(id) ON DELETE SET NULL,
    parent_form_id INTEGER REFERENCES forms(id) ON DELETE CASCADE,
    share_token TEXT NOT NULL UNIQUE,
    created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Explicit grants: one level per (form, user)
CREATE TABLE IF NOT EXISTS form_permissions (
    form_id INTEGER NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    level TEXT NOT NULL CHECK (level IN ('viewer', 'editor', 'admin')),
    PRIMARY KEY (form_id, user_id)
);

-- Submissions: one row per filled form
CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    form_id INTEGER NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
    submitted_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    parent_submission_id INTEGER REFERENCES submissions(id) ON DELETE CASCADE,
    submitted_at TEXT NOT NULL
);

-- Submission data: key/value answers, position keeps schema order
CREATE TABLE IF NOT EXISTS submission_data (
    submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
    field_name TEXT NOT NULL,
    field_value TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (submission_id, field_name)
);

-- Child relationships: edges scoped under a root submission
CREATE TABLE IF NOT EXISTS child_relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    root_submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
    source_submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
    target_submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
    relationship_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    CHECK (source_submission_id <> target_submission_id),
    UNIQUE (root_submission_id, source_submission_id, target_submission_id, relationship_type)
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_forms_original ON forms(original_form_id);
CREATE INDEX IF NOT EXISTS idx_forms_parent ON forms(parent_form_id);
CREATE INDEX IF NOT EXISTS idx_submissions_form ON submissions(form_id);
CREATE INDEX IF NOT EXISTS idx_submissions_parent ON submissions(parent_submission_id);
CREATE INDEX IF NOT EXISTS idx_submissions_user ON submissions(submitted_by);
CREATE INDEX IF NOT EXISTS idx_relationships_root ON child_relationships(root_submission_id);
"#;
