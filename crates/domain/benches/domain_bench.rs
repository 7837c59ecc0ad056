use common::{ProductId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Cart, Money, Order, ProductSnapshot};

fn snapshot(product_id: ProductId) -> ProductSnapshot {
    ProductSnapshot::new(product_id, "Benchmark Widget", Money::from_cents(1000)).unwrap()
}

fn bench_add_same_product(c: &mut Criterion) {
    let product_id = ProductId::new();

    c.bench_function("domain/add_item_same_product", |b| {
        b.iter(|| {
            let mut cart = Cart::new(UserId::new());
            for _ in 0..50 {
                cart.add_item(snapshot(product_id), 1).unwrap();
            }
            cart
        });
    });
}

fn bench_total_large_cart(c: &mut Criterion) {
    let mut cart = Cart::new(UserId::new());
    for _ in 0..200 {
        cart.add_item(snapshot(ProductId::new()), 3).unwrap();
    }

    c.bench_function("domain/total_200_lines", |b| {
        b.iter(|| cart.total());
    });
}

fn bench_create_order(c: &mut Criterion) {
    let user_id = UserId::new();
    let mut cart = Cart::new(user_id);
    for _ in 0..20 {
        cart.add_item(snapshot(ProductId::new()), 2).unwrap();
    }

    c.bench_function("domain/create_order_from_20_lines", |b| {
        b.iter(|| Order::create_from_lines(user_id, cart.line_snapshots()).unwrap());
    });
}

criterion_group!(
    benches,
    bench_add_same_product,
    bench_total_large_cart,
    bench_create_order
);
criterion_main!(benches);
