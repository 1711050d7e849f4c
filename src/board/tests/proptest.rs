//! Randomized invariants over play-outs from the start position.

use proptest::prelude::*;

use crate::board::{GenMode, MoveList, Position};

/// Apply a pseudo-random legal walk and return every position visited.
fn random_walk(choices: &[u8]) -> Vec<Position> {
    let mut positions = vec![Position::start()];
    for &choice in choices {
        let current = positions.last().unwrap();
        let moves = current.legal_moves();
        if moves.is_empty() {
            break;
        }
        let mv = moves[choice as usize % moves.len()];
        let mut next = current.clone();
        assert!(next.make_move(mv));
        positions.push(next);
    }
    positions
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_incremental_hashes_stay_consistent(choices in proptest::collection::vec(any::<u8>(), 0..60)) {
        for pos in random_walk(&choices) {
            prop_assert_eq!(pos.hash(), pos.compute_hash());
            prop_assert_eq!(pos.pawn_hash(), pos.compute_pawn_hash());
        }
    }

    #[test]
    fn prop_fen_round_trip(choices in proptest::collection::vec(any::<u8>(), 0..40)) {
        let positions = random_walk(&choices);
        let pos = positions.last().unwrap();
        let reparsed = Position::from_fen(&pos.to_fen()).unwrap();
        prop_assert_eq!(pos, &reparsed);
        prop_assert_eq!(pos.hash(), reparsed.hash());
    }

    #[test]
    fn prop_generated_moves_are_pseudo_legal(choices in proptest::collection::vec(any::<u8>(), 0..40)) {
        let positions = random_walk(&choices);
        let pos = positions.last().unwrap();
        let mut list = MoveList::new();
        pos.generate_all_moves(&mut list);
        for &mv in &list {
            prop_assert!(pos.is_move_pseudo_legal(mv), "{:?}", mv);
        }
    }

    #[test]
    fn prop_do_move_legality_matches_check_status(choices in proptest::collection::vec(any::<u8>(), 0..40)) {
        let positions = random_walk(&choices);
        let pos = positions.last().unwrap();
        let us = pos.side_to_move();
        let mut list = MoveList::new();
        pos.generate_all_moves(&mut list);
        for &mv in &list {
            let mut copy = pos.clone();
            let legal = copy.make_move(mv);
            // do_move accepts exactly the moves that leave our king safe
            prop_assert_eq!(legal, !copy.is_in_check(us), "{:?}", mv);
        }
    }

    #[test]
    fn prop_swap_colors_is_involution(choices in proptest::collection::vec(any::<u8>(), 0..40)) {
        let positions = random_walk(&choices);
        let pos = positions.last().unwrap();
        prop_assert_eq!(pos, &pos.swap_colors().swap_colors());
    }

    #[test]
    fn prop_capture_generation_partitions_moves(choices in proptest::collection::vec(any::<u8>(), 0..40)) {
        let positions = random_walk(&choices);
        let pos = positions.last().unwrap();
        let mut captures = MoveList::new();
        pos.generate_moves(GenMode::Captures, &mut captures);
        let mut quiets = MoveList::new();
        pos.generate_moves(GenMode::Quiets, &mut quiets);
        for &mv in &captures {
            prop_assert!(mv.is_capture() || mv.is_promotion());
            prop_assert!(!quiets.contains(mv));
        }
    }
}
