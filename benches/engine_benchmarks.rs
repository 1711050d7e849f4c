//! Criterion benchmarks: move generation throughput and fixed-depth
//! search.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use caracal::board::Position;
use caracal::{Game, Search, SearchParams};

const BENCH_POSITIONS: &[&str] = &[
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
];

fn bench_perft(c: &mut Criterion) {
    let start = Position::start();
    c.bench_function("perft_start_4", |b| {
        b.iter(|| black_box(start.perft(black_box(4))))
    });

    let kiwipete = Position::from_fen(BENCH_POSITIONS[1]).unwrap();
    c.bench_function("perft_kiwipete_3", |b| {
        b.iter(|| black_box(kiwipete.perft(black_box(3))))
    });
}

fn bench_movegen(c: &mut Criterion) {
    let positions: Vec<Position> = BENCH_POSITIONS
        .iter()
        .map(|fen| Position::from_fen(fen).unwrap())
        .collect();
    c.bench_function("legal_moves", |b| {
        b.iter(|| {
            for pos in &positions {
                black_box(pos.legal_moves());
            }
        })
    });
}

fn bench_search(c: &mut Criterion) {
    c.bench_function("search_depth_6", |b| {
        b.iter(|| {
            let game = Game::new(Position::start());
            let mut search = Search::new(16);
            let params = SearchParams::default().with_max_depth(6);
            black_box(search.run(&game, &params))
        })
    });
}

criterion_group!(benches, bench_perft, bench_movegen, bench_search);
criterion_main!(benches);
