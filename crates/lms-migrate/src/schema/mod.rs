//! Declarative catalog of the LMS tables.
//!
//! Every table is described as data: its name, primary key and column list.
//! The generic reader and upsert routines in `source` and `target` consume
//! these specs, so adding a table means adding an entry here and nothing else.
//!
//! [`LMS_TABLES`] is ordered by foreign-key dependency: a table only appears
//! after every table it references.

use ColumnKind::{Boolean, Float, Integer, Text, Timestamp};

/// Storage class of a column, used to pick the Rust type for reads and the
/// PostgreSQL type for DDL and parameter binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

impl ColumnKind {
    /// PostgreSQL type used when creating the column.
    pub fn pg_type(&self) -> &'static str {
        match self {
            ColumnKind::Text => "TEXT",
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Float => "DOUBLE PRECISION",
            ColumnKind::Boolean => "BOOLEAN",
            ColumnKind::Timestamp => "TIMESTAMP(3)",
        }
    }
}

/// One column of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

/// One table and its migration field mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub primary_key: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl TableSpec {
    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Position of the primary key column.
    pub fn pk_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.name == self.primary_key)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    ///
    /// Only ever creates; existing tables are left untouched.
    pub fn create_ddl(&self) -> String {
        let mut ddl = format!("CREATE TABLE IF NOT EXISTS {} (\n", quote_ident(self.name));

        for col in self.columns {
            let nullable = if col.nullable { "" } else { " NOT NULL" };
            ddl.push_str(&format!(
                "    {} {}{},\n",
                quote_ident(col.name),
                col.kind.pg_type(),
                nullable
            ));
        }

        ddl.push_str(&format!(
            "    PRIMARY KEY ({})\n)",
            quote_ident(self.primary_key)
        ));
        ddl
    }
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Look up a table by name (case-insensitive).
pub fn find_table(name: &str) -> Option<&'static TableSpec> {
    LMS_TABLES
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(name))
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        nullable: false,
    }
}

const fn opt(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        nullable: true,
    }
}

/// All LMS tables in foreign-key dependency order.
pub const LMS_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "User",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("email", Text),
            opt("name", Text),
            opt("imageUrl", Text),
            col("role", Text),
            col("createdAt", Timestamp),
            col("updatedAt", Timestamp),
        ],
    },
    TableSpec {
        name: "Category",
        primary_key: "id",
        columns: &[col("id", Text), col("name", Text)],
    },
    TableSpec {
        name: "Course",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("userId", Text),
            col("title", Text),
            opt("description", Text),
            opt("imageUrl", Text),
            opt("price", Float),
            col("isPublished", Boolean),
            opt("categoryId", Text),
            col("createdAt", Timestamp),
            col("updatedAt", Timestamp),
        ],
    },
    TableSpec {
        name: "Chapter",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("title", Text),
            opt("description", Text),
            opt("videoUrl", Text),
            col("position", Integer),
            col("isPublished", Boolean),
            col("isFree", Boolean),
            col("courseId", Text),
            col("createdAt", Timestamp),
            col("updatedAt", Timestamp),
        ],
    },
    TableSpec {
        name: "Attachment",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("name", Text),
            col("url", Text),
            col("courseId", Text),
            col("createdAt", Timestamp),
            col("updatedAt", Timestamp),
        ],
    },
    TableSpec {
        name: "UserProgress",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("userId", Text),
            col("chapterId", Text),
            col("isCompleted", Boolean),
            col("createdAt", Timestamp),
            col("updatedAt", Timestamp),
        ],
    },
    TableSpec {
        name: "PurchaseCode",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("code", Text),
            col("courseId", Text),
            col("isUsed", Boolean),
            opt("usedBy", Text),
            opt("usedAt", Timestamp),
            col("createdAt", Timestamp),
            col("updatedAt", Timestamp),
        ],
    },
    TableSpec {
        name: "Purchase",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("userId", Text),
            col("courseId", Text),
            opt("purchaseCodeId", Text),
            col("createdAt", Timestamp),
            col("updatedAt", Timestamp),
        ],
    },
    TableSpec {
        name: "BalanceTransaction",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("userId", Text),
            col("amount", Float),
            col("type", Text),
            opt("description", Text),
            col("createdAt", Timestamp),
            col("updatedAt", Timestamp),
        ],
    },
    TableSpec {
        name: "Quiz",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("title", Text),
            opt("description", Text),
            col("courseId", Text),
            col("position", Integer),
            col("isPublished", Boolean),
            opt("timer", Integer),
            col("createdAt", Timestamp),
            col("updatedAt", Timestamp),
        ],
    },
    TableSpec {
        name: "QuizQuestion",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("quizId", Text),
            col("text", Text),
            col("type", Text),
            opt("options", Text),
            col("correctAnswer", Text),
            col("points", Integer),
            col("position", Integer),
            col("createdAt", Timestamp),
            col("updatedAt", Timestamp),
        ],
    },
    TableSpec {
        name: "QuizResult",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("studentId", Text),
            col("quizId", Text),
            col("score", Float),
            col("totalPoints", Float),
            col("percentage", Float),
            col("submittedAt", Timestamp),
            col("createdAt", Timestamp),
            col("updatedAt", Timestamp),
        ],
    },
    TableSpec {
        name: "QuizAnswer",
        primary_key: "id",
        columns: &[
            col("id", Text),
            col("resultId", Text),
            col("questionId", Text),
            col("studentAnswer", Text),
            col("correctAnswer", Text),
            col("isCorrect", Boolean),
            col("pointsEarned", Integer),
            col("createdAt", Timestamp),
        ],
    },
];
