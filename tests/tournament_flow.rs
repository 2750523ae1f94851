//! Integration tests for the tournament service over the in-memory store: lifecycle,
//! group results, elimination progression, cancellation and rollback.

use arena_chaves::logic::ExitStage;
use arena_chaves::repository::{
    GroupRepository, MatchRepository, PartnerHistoryRepository, UnitRepository,
};
use arena_chaves::{
    EngineConfig, GroupStage, Match, MemoryStore, Phase, RosterEntry, Scope, Score,
    TieBreakPolicy, TournamentError, TournamentFormat, TournamentService, TournamentStage,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

fn service(seed: u64) -> TournamentService<MemoryStore> {
    let config = EngineConfig {
        tie_break: TieBreakPolicy::Deterministic,
        ..EngineConfig::default()
    };
    TournamentService::with_seed(Arc::new(MemoryStore::new()), config, seed)
}

fn a_wins() -> Score {
    Score::from_pairs(&[(6, 2), (6, 3)])
}

fn b_wins() -> Score {
    Score::from_pairs(&[(2, 6), (3, 6)])
}

/// Duo tournament with `players` registered (the first two protected) and registrations closed.
async fn duo_tournament(svc: &TournamentService<MemoryStore>, arena: Uuid, players: usize) -> Scope {
    let t = svc
        .create_tournament(arena, "Etapa 1", TournamentFormat::Duplas, None)
        .await
        .unwrap();
    let scope = t.scope();
    svc.open_registrations(scope).await.unwrap();
    let mut csv = String::from("nome,cabeca\n");
    for i in 0..players {
        csv.push_str(&format!("Jogador {i},{}\n", if i < 2 { "sim" } else { "" }));
    }
    svc.import_roster(scope, csv.as_bytes()).await.unwrap();
    svc.close_registrations(scope).await.unwrap();
    scope
}

async fn play_all_groups(svc: &TournamentService<MemoryStore>, scope: Scope) {
    for g in svc.list_groups(scope).await.unwrap() {
        for m in svc.list_matches(scope, Some(g.id)).await.unwrap() {
            svc.record_match_result(scope, m.id, a_wins()).await.unwrap();
        }
    }
}

async fn open_elimination_matches(svc: &TournamentService<MemoryStore>, scope: Scope) -> Vec<Match> {
    let mut ms: Vec<Match> = svc
        .list_matches(scope, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.node_id().is_some() && !m.is_finished())
        .collect();
    ms.sort_by_key(|m| m.id);
    ms
}

#[tokio::test]
async fn registrations_follow_the_lifecycle() {
    let svc = service(1);
    let t = svc
        .create_tournament(Uuid::new_v4(), "Etapa 1", TournamentFormat::Duplas, None)
        .await
        .unwrap();
    let scope = t.scope();
    let entry = RosterEntry {
        nome: "Ana".into(),
        cabeca_de_chave: false,
        equipe: None,
    };
    assert!(matches!(
        svc.register_player(scope, entry.clone()).await,
        Err(TournamentError::Validation(_))
    ));
    svc.open_registrations(scope).await.unwrap();
    svc.register_player(scope, entry.clone()).await.unwrap();
    let dup = RosterEntry {
        nome: "ANA".into(),
        ..entry
    };
    assert!(svc.register_player(scope, dup).await.is_err());
    assert_eq!(svc.list_players(scope).await.unwrap().len(), 1);
}

#[tokio::test]
async fn roster_import_is_all_or_nothing() {
    let svc = service(2);
    let t = svc
        .create_tournament(Uuid::new_v4(), "Etapa 1", TournamentFormat::Duplas, None)
        .await
        .unwrap();
    svc.open_registrations(t.scope()).await.unwrap();
    let err = svc
        .import_roster(t.scope(), "nome\nAna\nBia\nana\n".as_bytes())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already registered"));
    assert!(svc.list_players(t.scope()).await.unwrap().is_empty());
}

#[tokio::test]
async fn odd_roster_cannot_form_duos() {
    let svc = service(3);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 7).await;
    assert!(matches!(
        svc.form_units_and_groups(scope).await,
        Err(TournamentError::Validation(_))
    ));
    let t = svc.get_tournament(scope).await.unwrap();
    assert_eq!(t.stage, TournamentStage::InscricoesEncerradas);
}

#[tokio::test]
async fn forming_groups_schedules_every_group_match() {
    let svc = service(4);
    let arena = Uuid::new_v4();
    let scope = duo_tournament(&svc, arena, 14).await;
    let stage = svc.form_units_and_groups(scope).await.unwrap();

    // 7 duos -> groups of 3 and 4.
    assert_eq!(stage.units.len(), 7);
    let mut sizes: Vec<usize> = stage.groups.iter().map(|g| g.units.len()).collect();
    sizes.sort();
    assert_eq!(sizes, vec![3, 4]);
    assert_eq!(stage.matches.len(), 3 + 6);
    assert!(stage.units.iter().all(|u| u.group_id.is_some()));

    // The two protected players are never in the same duo.
    let protected = stage.units.iter().filter(|u| u.cabeca_de_chave).count();
    assert_eq!(protected, 2);

    let history = svc.store().load_history(arena).await.unwrap();
    assert!(!history.is_empty());
    assert_eq!(
        svc.get_tournament(scope).await.unwrap().stage,
        TournamentStage::ChavesGeradas
    );
}

/// Each duo of `stage` as the pair of its members' names.
async fn duo_names(
    svc: &TournamentService<MemoryStore>,
    scope: Scope,
    stage: &GroupStage,
) -> BTreeSet<BTreeSet<String>> {
    let names: HashMap<_, _> = svc
        .list_players(scope)
        .await
        .unwrap()
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    stage
        .units
        .iter()
        .map(|u| u.members.iter().map(|id| names[id].clone()).collect())
        .collect()
}

#[tokio::test]
async fn next_tournament_in_the_arena_avoids_earlier_duos() {
    for seed in 0..10 {
        let svc = service(seed);
        let arena = Uuid::new_v4();

        let first = duo_tournament(&svc, arena, 6).await;
        let stage = svc.form_units_and_groups(first).await.unwrap();
        let earlier = duo_names(&svc, first, &stage).await;

        // Same six people, registered again with new ids.
        let second = duo_tournament(&svc, arena, 6).await;
        let stage = svc.form_units_and_groups(second).await.unwrap();
        assert_eq!(stage.repeated_pairs, 0, "seed {seed}");
        let again = duo_names(&svc, second, &stage).await;
        assert!(earlier.is_disjoint(&again), "seed {seed}: {earlier:?} vs {again:?}");
    }
}

#[tokio::test]
async fn partner_history_stays_in_its_arena() {
    let svc = service(40);
    let arena = Uuid::new_v4();
    let scope = duo_tournament(&svc, arena, 6).await;
    svc.form_units_and_groups(scope).await.unwrap();
    assert!(!svc.store().load_history(arena).await.unwrap().is_empty());
    assert!(svc.store().load_history(Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_group_formation_leaves_nothing_behind() {
    let svc = service(5);
    let arena = Uuid::new_v4();
    let scope = duo_tournament(&svc, arena, 12).await;

    svc.store().fail_next("append_pairs");
    let err = svc.form_units_and_groups(scope).await.unwrap_err();
    assert!(matches!(err, TournamentError::Repository(_)));

    assert!(svc.store().list_units(scope).await.unwrap().is_empty());
    assert!(svc.store().list_groups(scope).await.unwrap().is_empty());
    assert!(svc.store().list_matches(scope).await.unwrap().is_empty());
    assert!(svc.store().load_history(arena).await.unwrap().is_empty());
    assert_eq!(
        svc.get_tournament(scope).await.unwrap().stage,
        TournamentStage::InscricoesEncerradas
    );

    // A retry goes through.
    svc.form_units_and_groups(scope).await.unwrap();
}

#[tokio::test]
async fn resubmitting_a_result_changes_nothing() {
    let svc = service(6);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 6).await;
    let stage = svc.form_units_and_groups(scope).await.unwrap();
    let m = stage.matches[0].clone();

    svc.record_match_result(scope, m.id, a_wins()).await.unwrap();
    let before = svc.store().get_unit(scope, m.unit_a).await.unwrap().unwrap();
    let again = svc.record_match_result(scope, m.id, a_wins()).await.unwrap();
    let after = svc.store().get_unit(scope, m.unit_a).await.unwrap().unwrap();

    assert!(again.unchanged);
    assert_eq!(before.stats, after.stats);
    let group = svc
        .store()
        .get_group(scope, m.group_id().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(group.partidas_finalizadas, 1);
}

#[tokio::test]
async fn editing_a_group_result_replaces_its_statistics() {
    let svc = service(7);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 6).await;
    let stage = svc.form_units_and_groups(scope).await.unwrap();
    let m = stage.matches[0].clone();

    svc.record_match_result(scope, m.id, a_wins()).await.unwrap();
    let out = svc.record_match_result(scope, m.id, b_wins()).await.unwrap();
    assert_eq!(out.partida.winner(), Some(m.unit_b));
    assert_eq!(out.stage, TournamentStage::Grupos);

    let a = svc.store().get_unit(scope, m.unit_a).await.unwrap().unwrap();
    assert_eq!(a.stats.jogos, 1);
    assert_eq!(a.stats.vitorias, 0);
    assert_eq!(a.stats.derrotas, 1);
    assert_eq!(a.stats.pontos, 0);
    assert_eq!(a.stats.games_vencidos, 5);
    assert_eq!(a.stats.games_perdidos, 12);

    let group = svc
        .store()
        .get_group(scope, m.group_id().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(group.partidas_finalizadas, 1);
}

#[tokio::test]
async fn invalid_score_is_rejected_before_any_write() {
    let svc = service(8);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 6).await;
    let stage = svc.form_units_and_groups(scope).await.unwrap();
    let m = &stage.matches[0];
    let tied = Score::from_pairs(&[(6, 4), (4, 6)]);
    assert!(matches!(
        svc.record_match_result(scope, m.id, tied).await,
        Err(TournamentError::Validation(_))
    ));
    let stored = svc.store().get_match(scope, m.id).await.unwrap().unwrap();
    assert!(!stored.is_finished());
}

#[tokio::test]
async fn concurrent_submissions_are_serialized() {
    let svc = service(9);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 6).await;
    let stage = svc.form_units_and_groups(scope).await.unwrap();
    let m = stage.matches[0].clone();

    let (x, y) = tokio::join!(
        svc.record_match_result(scope, m.id, a_wins()),
        svc.record_match_result(scope, m.id, b_wins()),
    );
    x.unwrap();
    y.unwrap();
    for unit in [m.unit_a, m.unit_b] {
        let u = svc.store().get_unit(scope, unit).await.unwrap().unwrap();
        assert_eq!(u.stats.jogos, 1);
    }
}

#[tokio::test]
async fn bracket_needs_every_group_complete() {
    let svc = service(10);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 12).await;
    let stage = svc.form_units_and_groups(scope).await.unwrap();
    svc.record_match_result(scope, stage.matches[0].id, a_wins())
        .await
        .unwrap();
    let err = svc.generate_elimination_bracket(scope, 2).await.unwrap_err();
    assert!(err.to_string().contains("Groups still in play"));
}

#[tokio::test]
async fn complete_group_stores_positions() {
    let svc = service(11);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 12).await;
    svc.form_units_and_groups(scope).await.unwrap();
    play_all_groups(&svc, scope).await;

    for g in svc.list_groups(scope).await.unwrap() {
        assert!(g.completo);
        let table = svc.get_standings(scope, g.id).await.unwrap();
        assert!(!table.provisional);
        let positions: Vec<u32> = table.rows.iter().map(|r| r.posicao).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        for u in svc.store().units_by_group(scope, g.id).await.unwrap() {
            assert!(u.posicao_grupo.is_some());
        }
    }
}

#[tokio::test]
async fn duo_tournament_runs_to_a_champion() {
    let svc = service(12);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 12).await;
    svc.form_units_and_groups(scope).await.unwrap();
    play_all_groups(&svc, scope).await;

    // Two groups of three, two qualifiers each: semifinals.
    let nodes = svc.generate_elimination_bracket(scope, 2).await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().all(|n| n.phase == Phase::Semifinal && n.match_id.is_some()));
    assert_eq!(
        svc.get_tournament(scope).await.unwrap().stage,
        TournamentStage::Semifinal
    );
    let classified = svc
        .list_units(scope)
        .await
        .unwrap()
        .iter()
        .filter(|u| u.classificada)
        .count();
    assert_eq!(classified, 4);

    // Group results are frozen while the bracket exists.
    let group_match = svc
        .list_matches(scope, None)
        .await
        .unwrap()
        .into_iter()
        .find(|m| m.group_id().is_some())
        .unwrap();
    assert!(svc
        .record_match_result(scope, group_match.id, b_wins())
        .await
        .is_err());

    for m in open_elimination_matches(&svc, scope).await {
        svc.record_match_result(scope, m.id, a_wins()).await.unwrap();
    }
    let finals = svc.get_bracket(scope, Some(Phase::Final)).await.unwrap();
    assert_eq!(finals.len(), 1);
    assert_eq!(
        svc.get_tournament(scope).await.unwrap().stage,
        TournamentStage::Final
    );

    let final_match = open_elimination_matches(&svc, scope).await.remove(0);
    let out = svc
        .record_match_result(scope, final_match.id, b_wins())
        .await
        .unwrap();
    assert_eq!(out.stage, TournamentStage::Finalizada);
    assert_eq!(out.champion, Some(final_match.unit_b));

    let table = svc.get_final_classification(scope).await.unwrap();
    assert_eq!(table.len(), 6);
    assert_eq!(table[0].exit, ExitStage::Campeao);
    assert_eq!(table[0].unit_id, final_match.unit_b);
    assert_eq!(table[0].pontos, 100);
    assert_eq!(table[1].exit, ExitStage::Vice);
    assert_eq!(table.iter().filter(|r| r.exit == ExitStage::Semifinal).count(), 2);
    assert_eq!(table.iter().filter(|r| r.exit == ExitStage::Grupos).count(), 2);
}

#[tokio::test]
async fn editing_a_semifinal_resets_the_final() {
    let svc = service(13);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 12).await;
    svc.form_units_and_groups(scope).await.unwrap();
    play_all_groups(&svc, scope).await;
    svc.generate_elimination_bracket(scope, 2).await.unwrap();

    let semis = open_elimination_matches(&svc, scope).await;
    for m in &semis {
        svc.record_match_result(scope, m.id, a_wins()).await.unwrap();
    }
    let old_final = svc.get_bracket(scope, Some(Phase::Final)).await.unwrap().remove(0);
    let old_match = old_final.match_id.unwrap();
    let loser_before = svc.store().get_unit(scope, semis[0].unit_b).await.unwrap().unwrap();

    let out = svc
        .record_match_result(scope, semis[0].id, b_wins())
        .await
        .unwrap();
    assert_eq!(out.nodes_reset, 1);
    assert_eq!(out.stage, TournamentStage::Final);

    let new_final = svc.get_bracket(scope, Some(Phase::Final)).await.unwrap().remove(0);
    assert_eq!(new_final.id, old_final.id);
    assert_ne!(new_final.match_id, Some(old_match));
    assert!(svc.store().get_match(scope, old_match).await.unwrap().is_none());
    let finalists = [new_final.slot_a.unit(), new_final.slot_b.unit()];
    assert!(finalists.contains(&Some(semis[0].unit_b)));

    // The edit moved one win, it did not add a game.
    let loser_after = svc.store().get_unit(scope, semis[0].unit_b).await.unwrap().unwrap();
    assert_eq!(loser_after.stats.jogos, loser_before.stats.jogos);
    assert_eq!(loser_after.stats.vitorias, loser_before.stats.vitorias + 1);
}

#[tokio::test]
async fn editing_a_semifinal_after_the_final_reverses_the_final() {
    let svc = service(19);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 12).await;
    svc.form_units_and_groups(scope).await.unwrap();
    play_all_groups(&svc, scope).await;
    svc.generate_elimination_bracket(scope, 2).await.unwrap();

    let semis = open_elimination_matches(&svc, scope).await;
    for m in &semis {
        svc.record_match_result(scope, m.id, a_wins()).await.unwrap();
    }
    // The other finalist keeps its place; its final must disappear from its record.
    let kept = semis[1].unit_a;
    let kept_before_final = svc.store().get_unit(scope, kept).await.unwrap().unwrap().stats;

    let final_match = open_elimination_matches(&svc, scope).await.remove(0);
    let done = svc
        .record_match_result(scope, final_match.id, a_wins())
        .await
        .unwrap();
    assert_eq!(done.stage, TournamentStage::Finalizada);
    let kept_after_final = svc.store().get_unit(scope, kept).await.unwrap().unwrap().stats;
    assert_eq!(kept_after_final.jogos, kept_before_final.jogos + 1);

    let out = svc
        .record_match_result(scope, semis[0].id, b_wins())
        .await
        .unwrap();
    assert_eq!(out.nodes_reset, 1);
    assert_eq!(out.stage, TournamentStage::Final);
    assert_eq!(out.champion, None);

    assert!(svc.store().get_match(scope, final_match.id).await.unwrap().is_none());
    let kept_now = svc.store().get_unit(scope, kept).await.unwrap().unwrap().stats;
    assert_eq!(kept_now, kept_before_final);
    assert_eq!(
        svc.get_tournament(scope).await.unwrap().stage,
        TournamentStage::Final
    );
    assert!(svc.get_final_classification(scope).await.is_err());

    let new_final = svc.get_bracket(scope, Some(Phase::Final)).await.unwrap().remove(0);
    let finalists = [new_final.slot_a.unit(), new_final.slot_b.unit()];
    assert!(finalists.contains(&Some(semis[0].unit_b)));
    assert!(finalists.contains(&Some(kept)));
    assert_eq!(open_elimination_matches(&svc, scope).await.len(), 1);
}

#[tokio::test]
async fn cancelling_elimination_returns_to_groups() {
    let svc = service(14);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 12).await;
    svc.form_units_and_groups(scope).await.unwrap();
    play_all_groups(&svc, scope).await;
    let units_before = svc.list_units(scope).await.unwrap();
    svc.generate_elimination_bracket(scope, 2).await.unwrap();
    for m in open_elimination_matches(&svc, scope).await {
        svc.record_match_result(scope, m.id, a_wins()).await.unwrap();
    }

    svc.cancel_elimination(scope).await.unwrap();
    assert!(svc.get_bracket(scope, None).await.unwrap().is_empty());
    assert_eq!(
        svc.get_tournament(scope).await.unwrap().stage,
        TournamentStage::Grupos
    );
    let units_after = svc.list_units(scope).await.unwrap();
    assert!(units_after.iter().all(|u| !u.classificada));
    for (before, after) in units_before.iter().zip(&units_after) {
        assert_eq!(before.id, after.id);
        assert_eq!(before.stats, after.stats);
    }

    // And the bracket can be generated again.
    svc.generate_elimination_bracket(scope, 2).await.unwrap();
}

#[tokio::test]
async fn failed_bracket_generation_is_rolled_back() {
    let svc = service(15);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 12).await;
    svc.form_units_and_groups(scope).await.unwrap();
    play_all_groups(&svc, scope).await;

    svc.store().fail_next("bulk_create_matches");
    assert!(svc.generate_elimination_bracket(scope, 2).await.is_err());
    assert!(svc.get_bracket(scope, None).await.unwrap().is_empty());
    assert!(svc.list_units(scope).await.unwrap().iter().all(|u| !u.classificada));
    assert_eq!(
        svc.get_tournament(scope).await.unwrap().stage,
        TournamentStage::Grupos
    );
}

#[tokio::test]
async fn cancelling_the_bracket_frees_the_partners() {
    let svc = service(16);
    let arena = Uuid::new_v4();
    let scope = duo_tournament(&svc, arena, 12).await;
    svc.form_units_and_groups(scope).await.unwrap();
    play_all_groups(&svc, scope).await;
    svc.generate_elimination_bracket(scope, 2).await.unwrap();

    svc.cancel_bracket(scope).await.unwrap();
    assert!(svc.list_units(scope).await.unwrap().is_empty());
    assert!(svc.list_groups(scope).await.unwrap().is_empty());
    assert!(svc.list_matches(scope, None).await.unwrap().is_empty());
    assert!(svc.get_bracket(scope, None).await.unwrap().is_empty());
    assert!(svc.store().load_history(arena).await.unwrap().is_empty());
    assert_eq!(
        svc.get_tournament(scope).await.unwrap().stage,
        TournamentStage::InscricoesEncerradas
    );
    assert_eq!(svc.list_players(scope).await.unwrap().len(), 12);

    svc.form_units_and_groups(scope).await.unwrap();
}

#[tokio::test]
async fn team_tournament_uses_the_fixed_layout() {
    let svc = service(17);
    let t = svc
        .create_tournament(Uuid::new_v4(), "Copa", TournamentFormat::Equipes, Some(2))
        .await
        .unwrap();
    let scope = t.scope();
    svc.open_registrations(scope).await.unwrap();
    let mut csv = String::from("nome,cabeca,equipe\n");
    for (team, protected) in [("Leões", true), ("Tubarões", true), ("Águias", false), ("Lobos", false)] {
        for i in 0..2 {
            let flag = if protected && i == 0 { "sim" } else { "" };
            csv.push_str(&format!("{team} {i},{flag},{team}\n"));
        }
    }
    svc.import_roster(scope, csv.as_bytes()).await.unwrap();
    svc.close_registrations(scope).await.unwrap();

    let stage = svc.form_units_and_groups(scope).await.unwrap();
    assert_eq!(stage.units.len(), 4);
    assert_eq!(stage.groups.len(), 2);
    // The two protected teams land in different groups.
    for g in &stage.groups {
        let seeds = stage
            .units
            .iter()
            .filter(|u| u.cabeca_de_chave && g.units.contains(&u.id))
            .count();
        assert_eq!(seeds, 1);
    }

    play_all_groups(&svc, scope).await;
    assert!(svc.generate_elimination_bracket(scope, 1).await.is_err());
    let nodes = svc.generate_elimination_bracket(scope, 2).await.unwrap();
    assert_eq!(nodes.len(), 15);
    assert_eq!(
        svc.get_tournament(scope).await.unwrap().stage,
        TournamentStage::Semifinal
    );
    assert_eq!(open_elimination_matches(&svc, scope).await.len(), 2);
}

#[tokio::test]
async fn tenants_do_not_see_each_other() {
    let svc = service(18);
    let scope = duo_tournament(&svc, Uuid::new_v4(), 6).await;
    let other = Scope::new(Uuid::new_v4(), scope.etapa_id);
    assert!(matches!(
        svc.get_tournament(other).await,
        Err(TournamentError::NotFound { .. })
    ));
}
