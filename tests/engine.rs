//! End-to-end flows over the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use hardscape::budget::{ChangeOrder, ChangeOrderStatus, Expense};
use hardscape::catalog::{Assembly, AssemblyItem, VendorPrice, VendorType};
use hardscape::config::EngineConfig;
use hardscape::db::{EstimateStore, MemoryStore};
use hardscape::error::TaxLookupError;
use hardscape::estimation::{LineRequest, Location};
use hardscape::tax::RateLookup;
use hardscape::{BudgetError, Category, Engine, EstimateError, EstimateRequest};

struct FixedRate(Decimal);

#[async_trait]
impl RateLookup for FixedRate {
    async fn lookup(&self, _zip: &str) -> Result<Decimal, TaxLookupError> {
        Ok(self.0)
    }
}

struct Unreachable;

#[async_trait]
impl RateLookup for Unreachable {
    async fn lookup(&self, _zip: &str) -> Result<Decimal, TaxLookupError> {
        Err(TaxLookupError::RequestFailed("connection refused".to_string()))
    }
}

fn item(name: &str, unit: &str, formula: &str, slug: &str, base: Decimal) -> AssemblyItem {
    AssemblyItem {
        name: name.to_string(),
        unit: unit.to_string(),
        base_unit_cost: base,
        qty_formula: formula.to_string(),
        material_slug: Some(slug.to_string()),
    }
}

fn assembly(name: &str, waste_pct: Decimal, items: Vec<AssemblyItem>) -> Assembly {
    Assembly {
        id: Uuid::new_v4(),
        slug: hardscape::catalog::slugify(name),
        name: name.to_string(),
        trade: "hardscape".to_string(),
        base_unit: "sqft".to_string(),
        waste_pct,
        items,
    }
}

fn patio() -> Assembly {
    assembly(
        "Paver Patio",
        dec!(0.10),
        vec![
            item("Pavers", "sqft", "area", "paver-std", dec!(3.50)),
            item("Base gravel", "ton", "area/100", "gravel-base", dec!(35)),
        ],
    )
}

fn install_labor() -> Assembly {
    assembly(
        "Install Labor",
        Decimal::ZERO,
        vec![item("Crew hours", "hr", "area/50", "crew-hour", dec!(60))],
    )
}

fn price(slug: &str, vendor_type: VendorType, cost: Decimal) -> VendorPrice {
    VendorPrice {
        material_slug: slug.to_string(),
        vendor_name: format!("{} co", vendor_type),
        vendor_type,
        unit_cost: cost,
        location_key: None,
        fetched_at: Utc::now(),
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    engine: Engine,
    patio: Assembly,
    labor: Assembly,
}

async fn fixture_with(config: EngineConfig, lookup: Arc<dyn RateLookup>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let patio = patio();
    let labor = install_labor();
    store.add_assembly(patio.clone()).await;
    store.add_assembly(labor.clone()).await;

    store.add_vendor_price(price("paver-std", VendorType::Supplier, dec!(4.00))).await;
    store.add_vendor_price(price("paver-std", VendorType::Retail, dec!(5.00))).await;
    store.add_vendor_price(price("gravel-base", VendorType::Index, dec!(40.00))).await;
    store.add_vendor_price(price("crew-hour", VendorType::Supplier, dec!(65.00))).await;

    let engine = Engine::with_rate_lookup(store.clone(), &config, lookup);
    Fixture {
        store,
        engine,
        patio,
        labor,
    }
}

async fn fixture() -> Fixture {
    fixture_with(EngineConfig::default(), Arc::new(FixedRate(dec!(0.095)))).await
}

fn la() -> Option<Location> {
    Some(Location {
        zip: Some("90001".to_string()),
        state: Some("CA".to_string()),
        city: Some("Los Angeles".to_string()),
        lat: None,
        lng: None,
    })
}

fn line(assembly: &Assembly, area: Decimal) -> LineRequest {
    LineRequest {
        assembly_id: assembly.id,
        inputs: HashMap::from([("area".to_string(), area)]),
    }
}

fn request(project_id: Uuid, location: Option<Location>, lines: Vec<LineRequest>) -> EstimateRequest {
    EstimateRequest {
        project_id,
        location,
        lines,
    }
}

#[tokio::test]
async fn test_build_prices_every_item() {
    let f = fixture().await;
    let project = Uuid::new_v4();

    let estimate = f
        .engine
        .estimates
        .build(&request(project, la(), vec![line(&f.patio, dec!(300))]))
        .await
        .unwrap();

    let items = &estimate.lines[0].items;
    assert_eq!(items.len(), 2);

    // 300 sqft + 10% waste, supplier beats retail.
    assert_eq!(items[0].qty, dec!(330));
    assert_eq!(items[0].unit_cost, dec!(4.00));
    assert_eq!(items[0].extended, dec!(1320.00));
    assert_eq!(items[0].provider, "supplier");
    assert!(!items[0].from_cache);

    assert_eq!(items[1].qty, dec!(3.3));
    assert_eq!(items[1].extended, dec!(132.00));
    assert_eq!(items[1].provider, "index");

    assert_eq!(estimate.lines[0].line_total, dec!(1452.00));
    assert_eq!(estimate.subtotal, dec!(1452.00));
    assert_eq!(estimate.tax_rate, dec!(0.095));
    assert_eq!(estimate.tax, dec!(137.94));
    assert_eq!(estimate.total, dec!(1589.94));
    assert_eq!(estimate.regional_factor, Decimal::ONE);
    assert_eq!(estimate.region_key.as_deref(), Some("90001"));

    let stored = f.store.get_estimate(estimate.id).await.unwrap().unwrap();
    assert_eq!(stored, estimate);
}

#[tokio::test]
async fn test_second_build_uses_price_snapshots() {
    let f = fixture().await;
    let req = request(Uuid::new_v4(), la(), vec![line(&f.patio, dec!(300))]);

    f.engine.estimates.build(&req).await.unwrap();
    assert_eq!(f.store.price_snapshot_count().await, 2);

    // A cheaper supplier price is ignored while the snapshot is fresh.
    f.store
        .add_vendor_price(price("paver-std", VendorType::Supplier, dec!(1.00)))
        .await;

    let again = f.engine.estimates.build(&req).await.unwrap();
    assert!(again.lines[0].items.iter().all(|i| i.from_cache));
    assert_eq!(again.lines[0].items[0].unit_cost, dec!(4.00));
    assert_eq!(f.store.price_snapshot_count().await, 2);
}

#[tokio::test]
async fn test_no_zip_skips_snapshots_and_tax() {
    let f = fixture().await;

    let estimate = f
        .engine
        .estimates
        .build(&request(Uuid::new_v4(), None, vec![line(&f.patio, dec!(100))]))
        .await
        .unwrap();

    assert_eq!(f.store.price_snapshot_count().await, 0);
    assert_eq!(estimate.tax_rate, Decimal::ZERO);
    assert_eq!(estimate.tax, Decimal::ZERO);
    assert_eq!(estimate.total, estimate.subtotal);
}

#[tokio::test]
async fn test_regional_factor_scales_unit_costs() {
    let f = fixture().await;
    f.store.set_regional_factor("90001", dec!(1.2)).await;

    let estimate = f
        .engine
        .estimates
        .build(&request(Uuid::new_v4(), la(), vec![line(&f.patio, dec!(300))]))
        .await
        .unwrap();

    assert_eq!(estimate.regional_factor, dec!(1.2));
    assert_eq!(estimate.lines[0].items[0].unit_cost, dec!(4.80));
    assert_eq!(estimate.lines[0].items[1].unit_cost, dec!(48.00));
    assert_eq!(estimate.subtotal, dec!(1742.40));
}

#[tokio::test]
async fn test_tax_falls_back_to_state_rate() {
    let f = fixture_with(EngineConfig::default(), Arc::new(Unreachable)).await;

    let estimate = f
        .engine
        .estimates
        .build(&request(Uuid::new_v4(), la(), vec![line(&f.patio, dec!(300))]))
        .await
        .unwrap();

    assert_eq!(estimate.tax_rate, dec!(0.0725));
    assert_eq!(estimate.tax, dec!(105.27));
}

#[tokio::test]
async fn test_invalid_formula_aborts_before_pricing() {
    let f = fixture().await;
    let broken = assembly(
        "Retaining Wall",
        Decimal::ZERO,
        vec![item("Blocks", "ea", "length * height", "wall-block", dec!(8))],
    );
    f.store.add_assembly(broken.clone()).await;

    // The valid first line must not be priced either.
    let err = f
        .engine
        .estimates
        .build(&request(
            Uuid::new_v4(),
            la(),
            vec![
                line(&f.patio, dec!(300)),
                LineRequest {
                    assembly_id: broken.id,
                    inputs: HashMap::from([("length".to_string(), dec!(20))]),
                },
            ],
        ))
        .await
        .unwrap_err();

    match err {
        EstimateError::InvalidFormula { line, item, .. } => {
            assert_eq!(line, 1);
            assert_eq!(item, "Blocks");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(f.store.estimate_count().await, 0);
    assert_eq!(f.store.price_snapshot_count().await, 0);
}

#[tokio::test]
async fn test_missing_price_aborts_estimate() {
    let f = fixture().await;
    let edging = assembly(
        "Steel Edging",
        Decimal::ZERO,
        vec![item("Edging", "lf", "length", "steel-edge", dec!(2.25))],
    );
    f.store.add_assembly(edging.clone()).await;

    let err = f
        .engine
        .estimates
        .build(&request(
            Uuid::new_v4(),
            la(),
            vec![
                line(&f.patio, dec!(300)),
                LineRequest {
                    assembly_id: edging.id,
                    inputs: HashMap::from([("length".to_string(), dec!(40))]),
                },
            ],
        ))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EstimateError::MaterialNotFound { ref material_slug, .. } if material_slug == "steel-edge"
    ));
    assert_eq!(f.store.estimate_count().await, 0);
}

#[tokio::test]
async fn test_placeholder_pricing_uses_assembly_cost() {
    let mut config = EngineConfig::default();
    config.pricing.fallback_to_base_cost = true;
    let f = fixture_with(config, Arc::new(FixedRate(Decimal::ZERO))).await;

    let edging = assembly(
        "Steel Edging",
        Decimal::ZERO,
        vec![item("Edging", "lf", "length", "steel-edge", dec!(2.25))],
    );
    f.store.add_assembly(edging.clone()).await;

    let estimate = f
        .engine
        .estimates
        .build(&request(
            Uuid::new_v4(),
            la(),
            vec![LineRequest {
                assembly_id: edging.id,
                inputs: HashMap::from([("length".to_string(), dec!(40))]),
            }],
        ))
        .await
        .unwrap();

    let edge = &estimate.lines[0].items[0];
    assert_eq!(edge.provider, hardscape::estimation::ASSEMBLY_DEFAULT_PROVIDER);
    assert_eq!(edge.unit_cost, dec!(2.25));
    assert_eq!(edge.extended, dec!(90.00));
}

#[tokio::test]
async fn test_unknown_assembly() {
    let f = fixture().await;
    let missing = Uuid::new_v4();

    let err = f
        .engine
        .estimates
        .build(&request(
            Uuid::new_v4(),
            la(),
            vec![LineRequest {
                assembly_id: missing,
                inputs: HashMap::new(),
            }],
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, EstimateError::AssemblyNotFound(id) if id == missing));
}

#[tokio::test]
async fn test_oversized_input_is_rejected_up_front() {
    let f = fixture().await;

    let err = f
        .engine
        .estimates
        .build(&request(Uuid::new_v4(), la(), vec![line(&f.patio, Decimal::MAX)]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EstimateError::InvalidInput { ref field, .. } if field == "lines[0].inputs.area"
    ));
    assert_eq!(f.store.price_snapshot_count().await, 0);
    assert_eq!(f.store.estimate_count().await, 0);
}

#[tokio::test]
async fn test_extended_cost_overflow_aborts_estimate() {
    let f = fixture().await;
    let slab = assembly(
        "Granite Slab",
        Decimal::ZERO,
        vec![item("Slab", "ea", "area", "granite-slab", dec!(900))],
    );
    f.store.add_assembly(slab.clone()).await;
    f.store
        .add_vendor_price(price("granite-slab", VendorType::Supplier, Decimal::MAX))
        .await;

    let err = f
        .engine
        .estimates
        .build(&request(Uuid::new_v4(), None, vec![line(&slab, dec!(300))]))
        .await
        .unwrap_err();

    assert!(matches!(err, EstimateError::OutOfRange(_)));
    assert_eq!(f.store.estimate_count().await, 0);
}

#[tokio::test]
async fn test_padded_zip_uses_local_price_and_clean_snapshot() {
    let f = fixture().await;
    f.store
        .add_vendor_price(VendorPrice {
            location_key: Some("90001".to_string()),
            vendor_name: "South LA Stone".to_string(),
            ..price("paver-std", VendorType::Supplier, dec!(3.00))
        })
        .await;

    let padded = Some(Location {
        zip: Some("90001 ".to_string()),
        state: Some(" ca".to_string()),
        ..Default::default()
    });
    let first = f
        .engine
        .estimates
        .build(&request(Uuid::new_v4(), padded, vec![line(&f.patio, dec!(300))]))
        .await
        .unwrap();

    assert_eq!(first.region_key.as_deref(), Some("90001"));
    assert_eq!(first.lines[0].items[0].unit_cost, dec!(3.00));
    assert_eq!(first.lines[0].items[0].source, "South LA Stone");

    let clean = f
        .engine
        .estimates
        .build(&request(Uuid::new_v4(), la(), vec![line(&f.patio, dec!(300))]))
        .await
        .unwrap();

    assert!(clean.lines[0].items[0].from_cache);
    assert_eq!(clean.lines[0].items[0].unit_cost, dec!(3.00));
}

#[tokio::test]
async fn test_finalize_then_report() {
    let f = fixture().await;
    let project = Uuid::new_v4();

    let estimate = f
        .engine
        .estimates
        .build(&request(
            project,
            la(),
            vec![line(&f.patio, dec!(300)), line(&f.labor, dec!(300))],
        ))
        .await
        .unwrap();

    let snapshot = f.engine.budget.finalize(estimate.id).await.unwrap();
    assert_eq!(snapshot.by_category.get(Category::Material), dec!(1452.00));
    assert_eq!(snapshot.by_category.get(Category::Labor), dec!(390.00));
    assert_eq!(snapshot.total, dec!(1842.00));

    let stored = f.store.get_estimate(estimate.id).await.unwrap().unwrap();
    assert!(stored.is_finalized());

    let report = f.engine.budget.get_report(project).await.unwrap();
    assert!(report.has_baseline);
    assert_eq!(report.total_actual, Decimal::ZERO);
    assert_eq!(report.remaining_by_category, report.by_category);
    assert_eq!(report.total_remaining, dec!(1842.00));

    let again = f.engine.budget.get_report(project).await.unwrap();
    assert_eq!(again, report);
}

#[tokio::test]
async fn test_expenses_reduce_remaining() {
    let f = fixture().await;
    let project = Uuid::new_v4();

    let estimate = f
        .engine
        .estimates
        .build(&request(project, la(), vec![line(&f.patio, dec!(300))]))
        .await
        .unwrap();
    f.engine.budget.finalize(estimate.id).await.unwrap();

    f.engine
        .budget
        .record_expense(&Expense {
            id: Uuid::new_v4(),
            project_id: project,
            category: Category::Material,
            vendor: "Stone Yard".to_string(),
            amount: dec!(500),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        })
        .await
        .unwrap();

    let report = f.engine.budget.get_report(project).await.unwrap();
    assert_eq!(report.actual_by_category.get(Category::Material), dec!(500));
    assert_eq!(report.remaining_by_category.get(Category::Material), dec!(952.00));
    assert_eq!(report.total_remaining, dec!(952.00));
}

#[tokio::test]
async fn test_finalize_twice_is_rejected() {
    let f = fixture().await;
    let estimate = f
        .engine
        .estimates
        .build(&request(Uuid::new_v4(), la(), vec![line(&f.patio, dec!(100))]))
        .await
        .unwrap();

    f.engine.budget.finalize(estimate.id).await.unwrap();
    let err = f.engine.budget.finalize(estimate.id).await.unwrap_err();

    assert!(matches!(err, BudgetError::AlreadyFinalized(id) if id == estimate.id));
    assert_eq!(f.store.budget_snapshot_count(estimate.project_id).await, 1);
}

#[tokio::test]
async fn test_snapshot_for_other_project_is_rejected() {
    let f = fixture().await;
    let estimate = f
        .engine
        .estimates
        .build(&request(Uuid::new_v4(), la(), vec![line(&f.patio, dec!(100))]))
        .await
        .unwrap();

    let other = Uuid::new_v4();
    let err = f
        .engine
        .budget
        .create_snapshot(other, estimate.id)
        .await
        .unwrap_err();

    assert!(matches!(err, BudgetError::ProjectMismatch { project_id, .. } if project_id == other));
    assert_eq!(f.store.budget_snapshot_count(other).await, 0);
}

#[tokio::test]
async fn test_report_uses_newest_snapshot() {
    let f = fixture().await;
    let project = Uuid::new_v4();

    let small = f
        .engine
        .estimates
        .build(&request(project, la(), vec![line(&f.patio, dec!(100))]))
        .await
        .unwrap();
    let large = f
        .engine
        .estimates
        .build(&request(project, la(), vec![line(&f.patio, dec!(300))]))
        .await
        .unwrap();

    f.engine.budget.create_snapshot(project, small.id).await.unwrap();
    f.engine.budget.create_snapshot(project, large.id).await.unwrap();
    assert_eq!(f.store.budget_snapshot_count(project).await, 2);

    let report = f.engine.budget.get_report(project).await.unwrap();
    assert_eq!(report.baseline_total, large.subtotal);
}

#[tokio::test]
async fn test_report_without_baseline() {
    let f = fixture().await;

    let report = f.engine.budget.get_report(Uuid::new_v4()).await.unwrap();
    assert!(!report.has_baseline);
    assert_eq!(report.total_remaining, Decimal::ZERO);
}

#[tokio::test]
async fn test_profit_counts_approved_change_orders() {
    let f = fixture().await;
    let project = Uuid::new_v4();

    let estimate = f
        .engine
        .estimates
        .build(&request(project, la(), vec![line(&f.patio, dec!(300))]))
        .await
        .unwrap();
    f.engine.budget.finalize(estimate.id).await.unwrap();

    for (amount, status) in [
        (dec!(200), ChangeOrderStatus::Approved),
        (dec!(75), ChangeOrderStatus::Pending),
    ] {
        f.store
            .add_change_order(ChangeOrder {
                id: Uuid::new_v4(),
                project_id: project,
                description: "Extra steps".to_string(),
                amount,
                status,
                created_at: Utc::now(),
            })
            .await;
    }

    let profit = f.engine.budget.profit_summary(project).await.unwrap();
    assert_eq!(profit.baseline_total, dec!(1452.00));
    assert_eq!(profit.contract_value, dec!(1652.00));
    assert_eq!(profit.pending_change_orders, dec!(75));
    assert_eq!(profit.gross_profit, dec!(1652.00));
}

#[tokio::test]
async fn test_demo_catalog_prices_demo_request() {
    let demos = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
    let seed = hardscape::db::CatalogSeed::from_file(&demos.join("catalog.json")).unwrap();
    let raw = std::fs::read_to_string(demos.join("request.json")).unwrap();
    let req: EstimateRequest = serde_json::from_str(&raw).unwrap();

    let store = Arc::new(MemoryStore::from_seed(seed));
    let engine = Engine::with_rate_lookup(
        store.clone(),
        &EngineConfig::default(),
        Arc::new(Unreachable),
    );

    let estimate = engine.estimates.build(&req).await.unwrap();
    assert_eq!(estimate.lines.len(), 2);
    assert_eq!(estimate.regional_factor, dec!(1.08));
    // Local supplier price for 78701 beats the global retail one.
    assert_eq!(estimate.lines[0].items[0].provider, "supplier");
    assert_eq!(estimate.tax_rate, dec!(0.0625));

    let snapshot = engine.budget.finalize(estimate.id).await.unwrap();
    assert_eq!(snapshot.total, estimate.subtotal);
}
