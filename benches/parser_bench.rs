//! 解析器吞吐基准测试

use std::hint::black_box;
use std::io::Cursor;

use criterion::{Criterion, criterion_group, criterion_main};

use mysql_database_replay_querylog::LogEventParser;

/// 生成交错会话的合成日志
fn synthetic_log(sessions: usize, queries_per_session: usize) -> String {
    let mut log = String::new();
    for id in 1..=sessions {
        log.push_str(&format!("150811  6:47:54  {id} Connect  user@host on\n"));
        log.push_str(&format!("{id} Init DB  bench\n"));
    }
    for round in 0..queries_per_session {
        for id in 1..=sessions {
            if round % 7 == 0 {
                // 多行语句
                log.push_str(&format!("{id} Query  SELECT col_a,\n"));
                log.push_str("       col_b\n");
                log.push_str(&format!("  FROM table_{round} WHERE id = {id}\n"));
            } else {
                log.push_str(&format!(
                    "{id} Query  SELECT * FROM table_{round} WHERE id = {id}\n"
                ));
            }
        }
    }
    for id in 1..=sessions {
        log.push_str(&format!("{id} Quit\n"));
    }
    log
}

fn bench_parse_events(c: &mut Criterion) {
    let log = synthetic_log(20, 50);

    c.bench_function("parse_events_20x50", |b| {
        b.iter(|| {
            let mut parser = LogEventParser::new(Cursor::new(black_box(log.as_str())));
            parser.parse_all().unwrap().len()
        })
    });

    c.bench_function("parse_events_batched", |b| {
        b.iter(|| {
            let mut parser = LogEventParser::new(Cursor::new(black_box(log.as_str())));
            let mut events = Vec::new();
            let mut batches = 0usize;
            while parser.parse_batch(100, &mut events).unwrap() {
                batches += 1;
            }
            (events.len(), batches)
        })
    });
}

criterion_group!(benches, bench_parse_events);
criterion_main!(benches);
