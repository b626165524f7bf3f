use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Federal deputy, as published by the Chamber of Deputies open-data API.
/// Imported records are read-only to the query engine.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Deputy {
    /// Official chamber id (unique). Expenses reference this, not the
    /// local surrogate.
    #[serde(rename = "id")]
    pub id: i64,

    #[serde(rename = "nome")]
    pub name: String,

    #[serde(rename = "siglaPartido")]
    pub party: String,

    #[serde(rename = "siglaUf")]
    pub state: String,

    #[serde(rename = "idLegislatura")]
    pub legislature: i64,

    #[serde(rename = "email", default)]
    pub email: Option<String>,

    #[serde(rename = "urlFoto", default)]
    pub photo_url: Option<String>,
}

/// One CEAP reimbursement line item claimed against a deputy's allowance.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Expense {
    #[serde(rename = "deputadoId")]
    pub deputy_id: i64,

    #[serde(rename = "ano")]
    pub year: i64,

    #[serde(rename = "mes")]
    pub month: i64,

    /// Document date, YYYY-MM-DD.
    #[serde(rename = "dataDocumento")]
    pub document_date: String,

    /// Free-text expense category as published (e.g. "LOCAÇÃO OU
    /// FRETAMENTO DE VEÍCULOS AUTOMOTORES").
    #[serde(rename = "tipoDespesa")]
    pub expense_type: String,

    #[serde(rename = "nomeFornecedor")]
    pub supplier_name: String,

    #[serde(rename = "cnpjCpfFornecedor", default)]
    pub supplier_tax_id: Option<String>,

    #[serde(rename = "codDocumento")]
    pub document_code: i64,

    #[serde(rename = "numDocumento")]
    pub document_number: String,

    /// Original document value.
    #[serde(rename = "valorDocumento")]
    pub document_value: f64,

    /// Disallowed (glossed) portion.
    #[serde(rename = "valorGlosa")]
    pub gloss_value: f64,

    /// Net value actually reimbursed. All aggregations use this.
    #[serde(rename = "valorLiquido")]
    pub net_value: f64,
}

impl Expense {
    /// Hash for duplicate detection on re-import. The open-data dumps
    /// overlap between monthly files, so the same document shows up twice.
    pub fn compute_dedup_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}",
            self.deputy_id, self.document_code, self.document_number, self.year, self.month
        ));
        format!("{:x}", hasher.finalize())
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS deputies (
            id_local INTEGER PRIMARY KEY AUTOINCREMENT,
            id INTEGER UNIQUE NOT NULL,
            name TEXT NOT NULL,
            party TEXT NOT NULL,
            state TEXT NOT NULL,
            legislature INTEGER NOT NULL,
            email TEXT,
            photo_url TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id_local INTEGER PRIMARY KEY AUTOINCREMENT,
            dedup_hash TEXT UNIQUE NOT NULL,
            deputy_id INTEGER NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            document_date TEXT NOT NULL,
            expense_type TEXT NOT NULL,
            supplier_name TEXT NOT NULL,
            supplier_tax_id TEXT,
            document_code INTEGER NOT NULL,
            document_number TEXT NOT NULL,
            document_value REAL NOT NULL,
            gloss_value REAL NOT NULL,
            net_value REAL NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_deputy_period
         ON expenses(deputy_id, year, month)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_type ON expenses(expense_type)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_period ON expenses(year, month)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_deputies_party ON deputies(party)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_deputies_state ON deputies(state)",
        [],
    )?;

    Ok(())
}

pub fn load_deputies_csv(csv_path: &Path) -> Result<Vec<Deputy>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open deputies CSV")?;

    let mut deputies = Vec::new();
    for result in rdr.deserialize() {
        let deputy: Deputy = result.context("Failed to deserialize deputy row")?;
        deputies.push(deputy);
    }

    Ok(deputies)
}

pub fn load_expenses_csv(csv_path: &Path) -> Result<Vec<Expense>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open expenses CSV")?;

    let mut expenses = Vec::new();
    for result in rdr.deserialize() {
        let expense: Expense = result.context("Failed to deserialize expense row")?;
        expenses.push(expense);
    }

    Ok(expenses)
}

/// Insert deputies, replacing on official-id collision (periodic refresh
/// updates party/state for re-elected deputies).
pub fn insert_deputies(conn: &Connection, deputies: &[Deputy]) -> Result<usize> {
    let mut upserted = 0;

    for dep in deputies {
        conn.execute(
            "INSERT INTO deputies (id, name, party, state, legislature, email, photo_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                party = excluded.party,
                state = excluded.state,
                legislature = excluded.legislature,
                email = excluded.email,
                photo_url = excluded.photo_url",
            params![
                dep.id,
                dep.name,
                dep.party,
                dep.state,
                dep.legislature,
                dep.email,
                dep.photo_url,
            ],
        )?;
        upserted += 1;
    }

    Ok(upserted)
}

/// Insert expenses idempotently: a dedup-hash constraint violation counts as
/// a skipped duplicate, not an error.
pub fn insert_expenses(conn: &Connection, expenses: &[Expense]) -> Result<(usize, usize)> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for exp in expenses {
        let hash = exp.compute_dedup_hash();

        let result = conn.execute(
            "INSERT INTO expenses (
                dedup_hash, deputy_id, year, month, document_date, expense_type,
                supplier_name, supplier_tax_id, document_code, document_number,
                document_value, gloss_value, net_value
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                hash,
                exp.deputy_id,
                exp.year,
                exp.month,
                exp.document_date,
                exp.expense_type,
                exp.supplier_name,
                exp.supplier_tax_id,
                exp.document_code,
                exp.document_number,
                exp.document_value,
                exp.gloss_value,
                exp.net_value,
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok((inserted, duplicates))
}

pub fn count_deputies(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM deputies", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_expenses(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;
    Ok(count)
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::*;
    use super::*;

    #[test]
    fn test_idempotent_expense_import() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        insert_deputies(&conn, &[deputy(1, "Teste", "PT", "SP")]).unwrap();

        let expenses = vec![
            expense(1, 2024, 1, "TELEFONIA", "OPERADORA A", 100.0),
            expense(1, 2024, 2, "TELEFONIA", "OPERADORA A", 120.0),
        ];

        let (inserted1, dups1) = insert_expenses(&conn, &expenses).unwrap();
        assert_eq!((inserted1, dups1), (2, 0));

        // Re-importing the same file must not duplicate rows
        let (inserted2, dups2) = insert_expenses(&conn, &expenses).unwrap();
        assert_eq!((inserted2, dups2), (0, 2));
        assert_eq!(count_expenses(&conn).unwrap(), 2);
    }

    #[test]
    fn test_dedup_hash_stable() {
        let exp = expense(1, 2024, 1, "TELEFONIA", "OPERADORA A", 100.0);
        let h1 = exp.compute_dedup_hash();
        let h2 = exp.compute_dedup_hash();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);

        // Net value is NOT part of the key: corrections to the same document
        // still count as the same expense
        let mut corrected = exp.clone();
        corrected.net_value = 99.0;
        assert_eq!(h1, corrected.compute_dedup_hash());
    }

    #[test]
    fn test_deputy_upsert_refreshes_party() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        insert_deputies(&conn, &[deputy(1, "Teste", "PSL", "SP")]).unwrap();
        insert_deputies(&conn, &[deputy(1, "Teste", "UNIÃO", "SP")]).unwrap();

        assert_eq!(count_deputies(&conn).unwrap(), 1);
        let party: String = conn
            .query_row("SELECT party FROM deputies WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(party, "UNIÃO");
    }
}
