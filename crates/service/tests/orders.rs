mod support;

use model::{CartItem, CartLine, EstimateRequest, OrderHistoryFilter};
use service::{ErrorKind, PurchaseService, PurchaseServiceImpl};
use support::*;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type Svc = PurchaseServiceImpl<InMemoryCatalog, InMemoryPurchases>;

async fn place_estimate(svc: &Svc, user: &str) -> Uuid {
    let request = EstimateRequest {
        user_id: user.to_string(),
        user_location: USER,
        lines: vec![
            CartLine {
                merchant_id: id(NASI).to_string(),
                is_starting_point: true,
                items: vec![
                    CartItem {
                        item_id: id(NASI_GORENG).to_string(),
                        quantity: 1,
                    },
                    CartItem {
                        item_id: id(ES_TEH).to_string(),
                        quantity: 2,
                    },
                ],
            },
            CartLine {
                merchant_id: id(KOPI).to_string(),
                is_starting_point: false,
                items: vec![CartItem {
                    item_id: id(ROTI_BAKAR).to_string(),
                    quantity: 1,
                }],
            },
        ],
    };
    svc.create_estimate(&CancellationToken::new(), &request)
        .await
        .unwrap()
        .estimate_id
}

#[tokio::test]
async fn test_confirm_unknown_estimate_is_not_found() {
    let shared = seeded();
    let svc = service(&shared);
    let cancel = CancellationToken::new();

    let err = svc
        .confirm_order(&cancel, &Uuid::from_u128(404).to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = svc.confirm_order(&cancel, "not-an-id").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(shared.lock().orders.is_empty());
}

#[tokio::test]
async fn test_confirming_twice_returns_the_same_order() {
    let shared = seeded();
    let svc = service(&shared);
    let cancel = CancellationToken::new();
    let estimate_id = place_estimate(&svc, "user-1").await;

    let first = svc.confirm_order(&cancel, &estimate_id.to_string()).await.unwrap();
    let second = svc.confirm_order(&cancel, &estimate_id.to_string()).await.unwrap();

    assert_eq!(first, second);
    let store = shared.lock();
    assert_eq!(store.orders.len(), 1);
    assert_eq!(store.orders[0].estimate_id, estimate_id);
}

#[tokio::test]
async fn test_history_groups_items_by_order_and_merchant() {
    let shared = seeded();
    let svc = service(&shared);
    let cancel = CancellationToken::new();
    let estimate_id = place_estimate(&svc, "user-1").await;
    let order_id = svc.confirm_order(&cancel, &estimate_id.to_string()).await.unwrap();

    let history = svc
        .get_order_history(&cancel, "user-1", &OrderHistoryFilter::default())
        .await
        .unwrap();

    assert_eq!(history.len(), 1);
    assert_eq!(history[0].order_id, order_id);
    let merchants: Vec<Uuid> = history[0].merchants.iter().map(|m| m.merchant.id).collect();
    assert_eq!(merchants, vec![id(NASI), id(KOPI)]);

    let nasi_items: Vec<(Uuid, i32, i64)> = history[0].merchants[0]
        .items
        .iter()
        .map(|i| (i.item_id, i.quantity, i.price))
        .collect();
    assert_eq!(
        nasi_items,
        vec![(id(NASI_GORENG), 1, 10_000), (id(ES_TEH), 2, 3_000)]
    );
}

#[tokio::test]
async fn test_history_is_scoped_to_the_user_and_filters() {
    let shared = seeded();
    let svc = service(&shared);
    let cancel = CancellationToken::new();
    let estimate_id = place_estimate(&svc, "user-1").await;
    svc.confirm_order(&cancel, &estimate_id.to_string()).await.unwrap();

    let other = svc
        .get_order_history(&cancel, "user-2", &OrderHistoryFilter::default())
        .await
        .unwrap();
    assert!(other.is_empty());

    let by_name = OrderHistoryFilter {
        name: Some("roti".to_string()),
        ..Default::default()
    };
    let history = svc.get_order_history(&cancel, "user-1", &by_name).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].merchants.len(), 1);
    assert_eq!(history[0].merchants[0].merchant.id, id(KOPI));

    let unknown_category = OrderHistoryFilter {
        category: Some("Bakery".to_string()),
        ..Default::default()
    };
    assert!(svc.get_order_history(&cancel, "user-1", &unknown_category).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unconfirmed_estimates_are_not_history() {
    let shared = seeded();
    let svc = service(&shared);
    place_estimate(&svc, "user-1").await;

    let history = svc
        .get_order_history(&CancellationToken::new(), "user-1", &OrderHistoryFilter::default())
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_cancel_after_order_write_rolls_back() {
    let shared = seeded();
    let svc = service(&shared);
    let estimate_id = place_estimate(&svc, "user-1").await;
    let cancel = CancellationToken::new();
    shared.lock().cancel_on_write = Some(cancel.clone());

    let err = svc.confirm_order(&cancel, &estimate_id.to_string()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    {
        let store = shared.lock();
        assert_eq!(store.transactions_begun, 2);
        assert_eq!(store.rollbacks, 1);
        assert!(store.orders.is_empty());
    }

    // The estimate is still confirmable once the client retries.
    svc.confirm_order(&CancellationToken::new(), &estimate_id.to_string())
        .await
        .unwrap();
    assert_eq!(shared.lock().orders.len(), 1);
}

#[tokio::test]
async fn test_cancelled_history_is_cancelled() {
    let shared = seeded();
    let svc = service(&shared);
    let estimate_id = place_estimate(&svc, "user-1").await;
    svc.confirm_order(&CancellationToken::new(), &estimate_id.to_string())
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = svc
        .get_order_history(&cancel, "user-1", &OrderHistoryFilter::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}
