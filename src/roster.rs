//! Roster import from CSV (`nome,cabeca,equipe`).

use crate::error::{TournamentError, TournamentResult};
use serde::Deserialize;
use std::io::Read;

/// One row of a roster file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RosterEntry {
    pub nome: String,
    pub cabeca_de_chave: bool,
    pub equipe: Option<String>,
}

#[derive(Deserialize)]
struct RawRow {
    nome: String,
    #[serde(default)]
    cabeca: Option<String>,
    #[serde(default)]
    equipe: Option<String>,
}

fn truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "sim" | "s" | "true" | "1" | "x" | "yes"
    )
}

/// Parse a roster. A header row is required; `cabeca` and `equipe` columns are optional.
/// Blank names are rejected with the offending line number.
pub fn parse_roster_csv<R: Read>(reader: R) -> TournamentResult<Vec<RosterEntry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut entries = Vec::new();
    for (i, row) in rdr.deserialize::<RawRow>().enumerate() {
        let line = i + 2;
        let row = row.map_err(|e| TournamentError::validation(format!("Roster line {line}: {e}")))?;
        if row.nome.trim().is_empty() {
            return Err(TournamentError::validation(format!("Roster line {line}: empty name")));
        }
        entries.push(RosterEntry {
            nome: row.nome,
            cabeca_de_chave: row.cabeca.as_deref().is_some_and(truthy),
            equipe: row.equipe.filter(|e| !e.trim().is_empty()),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_teams() {
        let data = "nome,cabeca,equipe\nAna,sim,Leões\nBia,,Leões\n Caio ,x,\n";
        let rows = parse_roster_csv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].cabeca_de_chave);
        assert!(!rows[1].cabeca_de_chave);
        assert_eq!(rows[1].equipe.as_deref(), Some("Leões"));
        assert_eq!(rows[2].nome, "Caio");
        assert_eq!(rows[2].equipe, None);
    }

    #[test]
    fn name_only_file_is_fine() {
        let rows = parse_roster_csv("nome\nAna\nBia\n".as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn blank_name_reports_line() {
        let err = parse_roster_csv("nome,cabeca\nAna,\n,sim\n".as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Roster line 3: empty name");
    }
}
