//! Group stage: partition units into groups and schedule every pairing inside a group.

use crate::error::{TournamentError, TournamentResult};
use crate::models::{CompetitiveUnit, UnitId};

/// Group sizes for `n` duos.
///
/// Groups of 3 are preferred. A remainder of 1 turns the last group of 3 into a 4, a
/// remainder of 2 turns the last two groups of 3 into 4s. Exactly 5 units play as a
/// single group of 5.
pub fn group_sizes(n: usize) -> TournamentResult<Vec<usize>> {
    if n < 3 {
        return Err(TournamentError::validation(format!(
            "At least 3 units are needed to form groups (got {n})"
        )));
    }
    if n == 5 {
        return Ok(vec![5]);
    }
    let threes = n / 3;
    let sizes = match n % 3 {
        0 => vec![3; threes],
        1 => {
            let mut s = vec![3; threes - 1];
            s.push(4);
            s
        }
        _ => {
            let mut s = vec![3; threes - 2];
            s.extend([4, 4]);
            s
        }
    };
    Ok(sizes)
}

/// Fill groups of the given sizes.
///
/// Protected seeds are dealt first, one per group in turn, so two seeds only share a
/// group once every group already holds one. The remaining units fill the free places in
/// the order given (callers shuffle beforehand).
pub fn partition_units(units: &[CompetitiveUnit], sizes: &[usize]) -> TournamentResult<Vec<Vec<UnitId>>> {
    let total: usize = sizes.iter().sum();
    if total != units.len() {
        return Err(TournamentError::validation(format!(
            "Group sizes cover {total} places but {} units were given",
            units.len()
        )));
    }
    let mut groups: Vec<Vec<UnitId>> = sizes.iter().map(|&s| Vec::with_capacity(s)).collect();

    let (seeds, rest): (Vec<&CompetitiveUnit>, Vec<&CompetitiveUnit>) =
        units.iter().partition(|u| u.cabeca_de_chave);

    let mut g = 0;
    for seed in seeds {
        // Skip full groups; at least one has room because the totals match.
        while groups[g % sizes.len()].len() >= sizes[g % sizes.len()] {
            g += 1;
        }
        groups[g % sizes.len()].push(seed.id);
        g += 1;
    }
    let mut free = groups
        .iter()
        .zip(sizes)
        .enumerate()
        .flat_map(|(i, (members, &size))| std::iter::repeat(i).take(size - members.len()))
        .collect::<Vec<_>>()
        .into_iter();
    for unit in rest {
        if let Some(i) = free.next() {
            groups[i].push(unit.id);
        }
    }
    Ok(groups)
}

/// Deal units into `group_count` groups in snake order (A B C C B A ...), protected seeds first.
/// Used by the team format, where the number of groups is fixed up front.
pub fn deal_into_groups(units: &[CompetitiveUnit], group_count: usize) -> TournamentResult<Vec<Vec<UnitId>>> {
    if !(2..=8).contains(&group_count) {
        return Err(TournamentError::validation(format!(
            "Team tournaments use between 2 and 8 groups (got {group_count})"
        )));
    }
    if units.len() < group_count * 2 {
        return Err(TournamentError::validation(format!(
            "{} groups need at least {} teams (got {})",
            group_count,
            group_count * 2,
            units.len()
        )));
    }
    let mut ordered: Vec<&CompetitiveUnit> = units.iter().filter(|u| u.cabeca_de_chave).collect();
    ordered.extend(units.iter().filter(|u| !u.cabeca_de_chave));

    let mut groups = vec![Vec::new(); group_count];
    for (i, unit) in ordered.into_iter().enumerate() {
        let lap = i / group_count;
        let pos = i % group_count;
        let g = if lap % 2 == 0 { pos } else { group_count - 1 - pos };
        groups[g].push(unit.id);
    }
    Ok(groups)
}

/// Every pairing of a group exactly once, ordered in rounds (circle method) so a unit
/// rarely plays twice in a row.
pub fn round_robin_pairings(units: &[UnitId]) -> Vec<(UnitId, UnitId)> {
    let mut ring: Vec<Option<UnitId>> = units.iter().copied().map(Some).collect();
    if ring.len() % 2 == 1 {
        ring.push(None);
    }
    let n = ring.len();
    let mut pairings = Vec::with_capacity(units.len() * units.len().saturating_sub(1) / 2);
    for _ in 0..n.saturating_sub(1) {
        for i in 0..n / 2 {
            if let (Some(a), Some(b)) = (ring[i], ring[n - 1 - i]) {
                pairings.push((a, b));
            }
        }
        // Keep the first entry fixed and rotate the rest.
        if n > 2 {
            let last = ring.remove(n - 1);
            ring.insert(1, last);
        }
    }
    pairings
}
