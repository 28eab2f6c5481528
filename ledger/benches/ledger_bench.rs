// Ledger procedure benchmarks.
//
// Covers coin grants, MCQ grading with a payout, and ledger page reads on a
// wallet with a long history.

use std::collections::BTreeMap;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

use chess_ledger::quest::{McqOption, NewQuest, QuestConfig};
use chess_ledger::{LedgerDB, LedgerService, Principal, Role};

fn setup() -> (LedgerService, Principal) {
    let svc = LedgerService::new(LedgerDB::open_temporary().expect("temp db"));
    let admin = Principal::new(Uuid::new_v4(), Role::MasterAdmin);
    (svc, admin)
}

fn live_quest(svc: &LedgerService, admin: &Principal) -> Uuid {
    let mut options = BTreeMap::new();
    options.insert("a".to_string(), McqOption { text: "Qh5".into(), is_correct: true });
    options.insert("b".to_string(), McqOption { text: "a3".into(), is_correct: false });
    let new = NewQuest {
        title: "Scholar's Mate".into(),
        description: String::new(),
        reward_coins: 1,
        attribute_id: None,
        config: QuestConfig::Mcq {
            question: "Mate in one?".into(),
            options,
        },
    };
    svc.grant_coins(admin, admin.user_id, 1_000, None).unwrap();
    let quest = svc.create_quest(admin, new).unwrap();
    svc.submit_quest(admin, quest.id).unwrap();
    svc.approve_quest(admin, quest.id).unwrap();
    quest.id
}

fn bench_grant(c: &mut Criterion) {
    let (svc, admin) = setup();
    let recipient = Uuid::new_v4();

    c.bench_function("ledger/grant_coins", |b| {
        b.iter(|| svc.grant_coins(&admin, recipient, 1, None).unwrap());
    });
}

fn bench_mcq_grading(c: &mut Criterion) {
    let (svc, admin) = setup();
    let quest = live_quest(&svc, &admin);

    c.bench_function("ledger/submit_mcq_answer", |b| {
        b.iter(|| {
            let student = Principal::new(Uuid::new_v4(), Role::Student);
            svc.submit_mcq_answer(&student, quest, "a").unwrap()
        });
    });
}

fn bench_ledger_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger/get_my_ledger");

    for history in [100usize, 1_000] {
        let (svc, admin) = setup();
        let student = Principal::new(Uuid::new_v4(), Role::Student);
        for _ in 0..history {
            svc.grant_coins(&admin, student.user_id, 1, None).unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(history), &history, |b, _| {
            b.iter(|| svc.get_my_ledger(&student, Some(50), Some(10)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_grant, bench_mcq_grading, bench_ledger_page);
criterion_main!(benches);
