use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

use stockhold_audit::AuditEntry;
use stockhold_core::{Entity, OrderId, ProductId, ReservationId};
use stockhold_inventory::{Product, Reservation};
use stockhold_sales::Order;

use super::r#trait::{InventoryStore, StoreError, StoreTransaction};
use crate::query::{AuditQuery, Cursor, OrderKey, OrderQuery, PAGE_SIZE, Page, PageRequest};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Product(ProductId),
    Order(OrderId),
}

impl core::fmt::Display for RowKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RowKey::Product(id) => write!(f, "product {id}"),
            RowKey::Order(id) => write!(f, "order {id}"),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    reservations: BTreeMap<ReservationId, Reservation>,
    orders: BTreeMap<OrderId, Order>,
    audit: Vec<AuditEntry>,
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    lock_timeout: Duration,
    #[cfg(test)]
    fail_audit_appends: std::sync::atomic::AtomicBool,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("table lock poisoned".to_string()))
    }

    fn row_lock(&self, key: RowKey) -> Result<Arc<RowMutex<()>>, StoreError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StoreError::Unavailable("row lock table poisoned".to_string()))?;
        Ok(locks.entry(key).or_default().clone())
    }
}

/// In-memory transactional store.
///
/// Intended for tests/dev and single-process deployments. Committed rows live
/// behind one `RwLock`; each product and order row has its own async mutex,
/// which a transaction holds from `lock_*` until it ends. Writes are staged in
/// the transaction and applied in one step on commit.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                lock_timeout,
                #[cfg(test)]
                fail_audit_appends: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Make every subsequent audit append fail (rollback path tests).
    #[cfg(test)]
    pub(crate) fn fail_audit_appends(&self, fail: bool) {
        self.shared
            .fail_audit_appends
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of committed audit entries.
    pub fn audit_len(&self) -> Result<usize, StoreError> {
        Ok(self.shared.read()?.audit.len())
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(InMemoryTransaction::new(self.shared.clone())))
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.shared.read()?.products.get(&id).cloned())
    }

    async fn products(&self, page: PageRequest) -> Result<Page<Product>, StoreError> {
        let tables = self.shared.read()?;
        let lower = match page.after {
            Some(after) => Excluded(ProductId::from_uuid(after)),
            None => Unbounded,
        };
        let rows = tables
            .products
            .range((lower, Unbounded))
            .take(PAGE_SIZE + 1)
            .map(|(_, p)| p.clone())
            .collect();
        Ok(Page::from_overfetch(rows, Cursor::after_product))
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.shared.read()?.reservations.get(&id).cloned())
    }

    async fn reservations(&self, page: PageRequest) -> Result<Page<Reservation>, StoreError> {
        let tables = self.shared.read()?;
        let lower = match page.after {
            Some(after) => Excluded(ReservationId::from_uuid(after)),
            None => Unbounded,
        };
        let rows = tables
            .reservations
            .range((lower, Unbounded))
            .take(PAGE_SIZE + 1)
            .map(|(_, r)| r.clone())
            .collect();
        Ok(Page::from_overfetch(rows, Cursor::after_reservation))
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError> {
        let tables = self.shared.read()?;
        let mut expired: Vec<Reservation> = tables
            .reservations
            .values()
            .filter(|r| r.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|r| (r.expires_at(), *r.id()));
        expired.truncate(limit);
        Ok(expired)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.shared.read()?.orders.get(&id).cloned())
    }

    async fn orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError> {
        let tables = self.shared.read()?;
        let mut rows: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| query.admits(o))
            .cloned()
            .collect();
        rows.sort_by(|a, b| OrderKey::of(a).compare(&OrderKey::of(b), query.sort));
        rows.truncate(PAGE_SIZE + 1);
        let sort = query.sort;
        Ok(Page::from_overfetch(rows, |o| Cursor::after_order(o, sort)))
    }

    async fn audit_entries(&self, query: &AuditQuery) -> Result<Page<AuditEntry>, StoreError> {
        let tables = self.shared.read()?;
        let mut rows: Vec<AuditEntry> = tables
            .audit
            .iter()
            .filter(|e| query.admits(e))
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.timestamp(), e.id()));
        rows.truncate(PAGE_SIZE + 1);
        Ok(Page::from_overfetch(rows, Cursor::after_audit))
    }
}

/// Staged writes plus the row locks they were made under.
struct InMemoryTransaction {
    shared: Arc<Shared>,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    products: HashMap<ProductId, Product>,
    /// `None` marks a deletion.
    reservations: HashMap<ReservationId, Option<Reservation>>,
    orders: HashMap<OrderId, Order>,
    audit: Vec<AuditEntry>,
}

impl InMemoryTransaction {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            held: HashMap::new(),
            products: HashMap::new(),
            reservations: HashMap::new(),
            orders: HashMap::new(),
            audit: Vec::new(),
        }
    }

    async fn acquire(&mut self, key: RowKey) -> Result<(), StoreError> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let mutex = self.shared.row_lock(key)?;
        let timeout = self.shared.lock_timeout;
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                self.held.insert(key, guard);
                Ok(())
            }
            Err(_) => Err(StoreError::LockTimeout(format!(
                "{key} not acquired within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    fn require_lock(&self, key: RowKey) -> Result<(), StoreError> {
        if self.held.contains_key(&key) {
            Ok(())
        } else {
            Err(StoreError::Constraint(format!(
                "write to {key} without holding its row lock"
            )))
        }
    }

    fn visible_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        if let Some(p) = self.products.get(&id) {
            return Ok(Some(p.clone()));
        }
        Ok(self.shared.read()?.products.get(&id).cloned())
    }

    fn visible_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        if let Some(staged) = self.reservations.get(&id) {
            return Ok(staged.clone());
        }
        Ok(self.shared.read()?.reservations.get(&id).cloned())
    }

    fn visible_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        if let Some(o) = self.orders.get(&id) {
            return Ok(Some(o.clone()));
        }
        Ok(self.shared.read()?.orders.get(&id).cloned())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        if self.visible_product(id)?.is_none() {
            return Ok(None);
        }
        self.acquire(RowKey::Product(id)).await?;
        self.visible_product(id)
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.visible_product(id)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let id = *product.id();
        if self.visible_product(id)?.is_some() {
            return Err(StoreError::Conflict(format!("product {id} already exists")));
        }
        self.products.insert(id, product.clone());
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let id = *product.id();
        self.require_lock(RowKey::Product(id))?;
        self.products.insert(id, product.clone());
        Ok(())
    }

    async fn reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        self.visible_reservation(id)
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> Result<(), StoreError> {
        let id = *reservation.id();
        self.require_lock(RowKey::Product(reservation.product_id()))?;
        if self.visible_reservation(id)?.is_some() {
            return Err(StoreError::Conflict(format!("reservation {id} already exists")));
        }
        self.reservations.insert(id, Some(reservation.clone()));
        Ok(())
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> Result<(), StoreError> {
        self.require_lock(RowKey::Product(reservation.product_id()))?;
        self.reservations
            .insert(*reservation.id(), Some(reservation.clone()));
        Ok(())
    }

    async fn delete_reservation(&mut self, id: ReservationId) -> Result<bool, StoreError> {
        let Some(existing) = self.visible_reservation(id)? else {
            return Ok(false);
        };
        self.require_lock(RowKey::Product(existing.product_id()))?;
        self.reservations.insert(id, None);
        Ok(true)
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        if self.visible_order(id)?.is_none() {
            return Ok(None);
        }
        self.acquire(RowKey::Order(id)).await?;
        self.visible_order(id)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let id = *order.id();
        if self.visible_order(id)?.is_some() {
            return Err(StoreError::Conflict(format!("order {id} already exists")));
        }
        self.orders.insert(id, order.clone());
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let id = *order.id();
        self.require_lock(RowKey::Order(id))?;
        self.orders.insert(id, order.clone());
        Ok(())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        #[cfg(test)]
        if self
            .shared
            .fail_audit_appends
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(StoreError::Unavailable("audit append failed".to_string()));
        }
        self.audit.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        {
            let mut tables = this
                .shared
                .tables
                .write()
                .map_err(|_| StoreError::Unavailable("table lock poisoned".to_string()))?;
            tables.products.extend(this.products);
            for (id, staged) in this.reservations {
                match staged {
                    Some(r) => {
                        tables.reservations.insert(id, r);
                    }
                    None => {
                        tables.reservations.remove(&id);
                    }
                }
            }
            tables.orders.extend(this.orders);
            tables.audit.extend(this.audit);
        }
        // Row locks are released only after the writes are visible.
        drop(this.held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockhold_audit::AuditRecorder;
    use stockhold_core::Money;
    use stockhold_inventory::NewProduct;

    fn product(total: u32) -> Product {
        Product::create(
            NewProduct {
                name: "Widget".to_string(),
                price: Money::from_minor(1000),
                total_stock: total,
                available_stock: None,
                reserved_stock: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    async fn seeded(store: &InMemoryStore, p: &Product) {
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(p).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let store = InMemoryStore::new();
        let p = product(5);

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        assert!(store.product(*p.id()).await.unwrap().is_none());
        assert!(tx.product(*p.id()).await.unwrap().is_some());
        tx.commit().await.unwrap();

        assert_eq!(store.product(*p.id()).await.unwrap(), Some(p));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryStore::new();
        let p = product(5);
        seeded(&store, &p).await;

        {
            let mut tx = store.begin().await.unwrap();
            let mut locked = tx.lock_product(*p.id()).await.unwrap().unwrap();
            locked.reserve(2, Utc::now()).unwrap();
            tx.update_product(&locked).await.unwrap();
            tx.append_audit(&AuditRecorder::system(Utc::now()).product_created(&locked))
                .await
                .unwrap();
        }

        let current = store.product(*p.id()).await.unwrap().unwrap();
        assert_eq!(current.stock().available(), 5);
        assert_eq!(store.audit_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn second_locker_times_out_while_first_holds_the_row() {
        let store = InMemoryStore::with_lock_timeout(Duration::from_millis(50));
        let p = product(5);
        seeded(&store, &p).await;

        let mut first = store.begin().await.unwrap();
        first.lock_product(*p.id()).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let err = second.lock_product(*p.id()).await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(_)));

        first.rollback().await.unwrap();
        assert!(second.lock_product(*p.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn relocking_within_a_transaction_does_not_deadlock() {
        let store = InMemoryStore::with_lock_timeout(Duration::from_millis(50));
        let p = product(5);
        seeded(&store, &p).await;

        let mut tx = store.begin().await.unwrap();
        tx.lock_product(*p.id()).await.unwrap();
        assert!(tx.lock_product(*p.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn distinct_products_do_not_block_each_other() {
        let store = InMemoryStore::with_lock_timeout(Duration::from_millis(50));
        let (a, b) = (product(1), product(1));
        seeded(&store, &a).await;
        seeded(&store, &b).await;

        let mut first = store.begin().await.unwrap();
        first.lock_product(*a.id()).await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(second.lock_product(*b.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_without_lock_is_rejected() {
        let store = InMemoryStore::new();
        let p = product(5);
        seeded(&store, &p).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx.update_product(&p).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let store = InMemoryStore::new();
        let p = product(5);
        seeded(&store, &p).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_product(&p).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_product_locks_nothing() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_product(ProductId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn product_pages_follow_id_order() {
        let store = InMemoryStore::new();
        let mut ids = Vec::new();
        for _ in 0..13 {
            let p = product(1);
            ids.push(*p.id());
            seeded(&store, &p).await;
        }
        ids.sort();

        let first = store.products(PageRequest::first()).await.unwrap();
        assert_eq!(first.items.len(), PAGE_SIZE);
        let cursor = first.next_cursor.expect("second page");
        let second = store
            .products(PageRequest::products(Some(&cursor)).unwrap())
            .await
            .unwrap();
        assert_eq!(second.items.len(), 3);
        assert!(second.next_cursor.is_none());

        let seen: Vec<ProductId> = first
            .items
            .iter()
            .chain(second.items.iter())
            .map(|p| *p.id())
            .collect();
        assert_eq!(seen, ids);
    }
}
