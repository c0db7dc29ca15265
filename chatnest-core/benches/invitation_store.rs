use chatnest_core::core_chat::{
    ChatDirectory, ChatSqlStore, CollabManagerImpl, InvitationRegistry, PermissionLevel,
    TokenCodec, TokenSecret,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

const TTL: Duration = Duration::from_secs(3600);

fn bench_invitation_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("invitation_lifecycle");
    group.measurement_time(Duration::from_secs(10));

    let manager = CollabManagerImpl::new(
        ChatSqlStore::memory().unwrap(),
        TokenCodec::new(TokenSecret::generate()),
    );
    let owner = manager.register_user("owner@bench.local", "Owner").unwrap().id;
    let directory = manager.create_directory(&owner, "Bench").unwrap();
    let chat = manager.create_chat(&owner, &directory.id, "Bench chat").unwrap().id;

    // Re-inviting one address takes the supersede path every time
    group.bench_function("create_superseding", |b| {
        b.iter(|| {
            let inv = manager
                .create_invitation(&chat, &owner, "guest@bench.local", PermissionLevel::ReadOnly, TTL)
                .unwrap();
            black_box(inv)
        });
    });

    let mut counter = 0u64;
    group.bench_function("create_and_consume", |b| {
        b.iter(|| {
            counter += 1;
            let email = format!("guest{counter}@bench.local");
            let guest = manager.register_user(&email, "Guest").unwrap().id;
            let inv = manager
                .create_invitation(&chat, &owner, &email, PermissionLevel::ReadWrite, TTL)
                .unwrap();
            black_box(manager.consume(inv.token.as_str(), &guest).unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_invitation_lifecycle);
criterion_main!(benches);
