//! Evaluation sanity: material-decided positions score as decided, dead
//! positions score zero, and the evaluator is color-symmetric.

use crate::board::Position;
use crate::nnue::Evaluator;
use crate::search::score::KNOWN_WIN;

#[test]
fn test_dead_material_is_zero() {
    let evaluator = Evaluator::classical();
    for fen in [
        "4k2K/8/8/8/8/8/8/8 w - - 0 1",        // KvK
        "4k2K/8/8/8/3N4/8/8/8 w - - 0 1",      // KvN
        "4k2K/8/8/8/3b4/8/8/8 w - - 0 1",      // KvB
        "4k2K/8/8/8/3nn3/8/8/8 w - - 0 1",     // KvNN
        "4k2K/8/8/8/3nN3/8/8/8 w - - 0 1",     // KNvKN
    ] {
        let pos = Position::from_fen(fen).unwrap();
        assert_eq!(evaluator.evaluate(&pos), 0, "{fen}");
    }
}

#[test]
fn test_extra_piece_wins() {
    let evaluator = Evaluator::classical();
    for fen in [
        "4k3/8/8/8/8/8/8/R3K3 w - - 0 1", // KvR
        "4k3/8/8/8/8/8/8/Q3K3 w - - 0 1", // KvQ
        "4k3/8/8/8/8/8/8/NB2K3 w - - 0 1", // KBNvK
    ] {
        let pos = Position::from_fen(fen).unwrap();
        let score = evaluator.evaluate(&pos);
        assert!(score > KNOWN_WIN, "{fen}: {score}");
    }
}

#[test]
fn test_losing_side_sees_negative() {
    let evaluator = Evaluator::classical();
    let pos = Position::from_fen("4k3/8/8/8/8/8/8/Q3K3 b - - 0 1").unwrap();
    assert!(evaluator.evaluate(&pos) < -KNOWN_WIN);
}

#[test]
fn test_eval_invariant_under_color_swap() {
    let evaluator = Evaluator::classical();
    for fen in [
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
        "8/k7/3p4/p2P1p2/P2P1P2/8/8/K7 w - - 0 1",
    ] {
        let pos = Position::from_fen(fen).unwrap();
        let swapped = pos.swap_colors();
        assert_eq!(
            evaluator.evaluate(&pos),
            evaluator.evaluate(&swapped),
            "{fen}"
        );
    }
}

#[test]
fn test_material_advantage_visible() {
    let evaluator = Evaluator::classical();
    // white up a rook in a normal middlegame-ish position
    let pos =
        Position::from_fen("1k6/ppp5/8/8/8/8/PPP5/1K2R3 w - - 0 1").unwrap();
    assert!(evaluator.evaluate(&pos) > 300);
}
