//! Orders, distributions and installments, with the cascades between them.

pub mod cascade;
pub mod distribuciones;
pub mod handlers;
pub mod letras;
pub mod pedidos;

use chrono::{Local, NaiveDate};

/// Business date used for due-date checks.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use chrono::{Days, NaiveDate};
    use rust_decimal::Decimal;
    use sqlx::PgPool;
    use uuid::Uuid;

    use super::{distribuciones, letras, pedidos, today};
    use crate::catalog::{empresas, proveedores};
    use crate::error::AppError;
    use crate::models::distribucion::{CreateDistribucion, UpdateDistribucion};
    use crate::models::empresa::CreateEmpresa;
    use crate::models::letra::{BulkLetras, CreateLetra, MarcarPagada, UpdateLetra};
    use crate::models::pedido::CreatePedido;
    use crate::models::proveedor::CreateProveedor;
    use crate::models::{EstadoPedido, Pedido};

    /// Test helper to create a migrated test database pool from `DATABASE_URL`.
    async fn create_test_pool() -> Result<PgPool, anyhow::Error> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL not set for tests"))?;
        let pool = PgPool::connect(&database_url).await?;
        crate::db::run_migrations(&pool).await?;
        Ok(pool)
    }

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn in_days(n: u64) -> NaiveDate {
        today().checked_add_days(Days::new(n)).unwrap()
    }

    async fn setup(pool: &PgPool) -> (i64, i64) {
        let proveedor = proveedores::create(
            pool,
            CreateProveedor {
                nombre: format!("Norton {}", Uuid::new_v4()),
                identificador: None,
                color: None,
                ruc: None,
                direccion: None,
                telefono: None,
                email: None,
                plazo_credito_default: None,
                activo: None,
                vendedor_id: None,
                notas: None,
            },
        )
        .await
        .expect("proveedor");

        let ruc = format!("{:011}", Uuid::new_v4().as_u128() % 100_000_000_000);
        let empresa = empresas::create(
            pool,
            CreateEmpresa {
                nombre: format!("Empresa {}", Uuid::new_v4()),
                ruc,
                direccion: None,
                telefono: None,
                email_contacto: None,
                activo: None,
            },
        )
        .await
        .expect("empresa");

        (proveedor.id, empresa.id)
    }

    async fn pedido(pool: &PgPool, proveedor_id: i64, total: i64, es_contado: bool, fecha: NaiveDate) -> Pedido {
        pedidos::create(
            pool,
            CreatePedido {
                proveedor_id,
                monto_total_pedido: dec(total),
                monto_pagado: None,
                es_contado: Some(es_contado),
                fecha_pedido: fecha,
                plazo_dias: None,
                descripcion: None,
                notas_internas: None,
                numero_pedido: None,
            },
        )
        .await
        .expect("pedido")
    }

    async fn distribuir(pool: &PgPool, pedido_id: Uuid, empresa_id: i64, monto: i64) -> i64 {
        distribuciones::create(
            pool,
            CreateDistribucion {
                pedido_id,
                empresa_id,
                monto_final: dec(monto),
                fecha_distribucion: None,
                notas: None,
            },
            today(),
        )
        .await
        .expect("distribucion")
        .id
    }

    async fn reload(pool: &PgPool, id: Uuid) -> Pedido {
        pedidos::get(pool, id).await.expect("reload").pedido
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_order_numbers_increment_per_supplier() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let (proveedor_id, _) = setup(&pool).await;
        let fecha = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let first = pedido(&pool, proveedor_id, 1000, false, fecha).await;
        let second = pedido(&pool, proveedor_id, 1000, false, fecha).await;

        assert_eq!(first.numero_pedido.as_deref(), Some("NORT01062501"));
        assert_eq!(second.numero_pedido.as_deref(), Some("NORT01062502"));
        assert_eq!(first.plazo_dias, 60);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_first_distribution_assigns_order() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let (proveedor_id, empresa_id) = setup(&pool).await;
        let p = pedido(&pool, proveedor_id, 1000, false, today()).await;
        assert_eq!(p.estado, EstadoPedido::Pendiente);

        distribuir(&pool, p.id, empresa_id, 600).await;

        let p = reload(&pool, p.id).await;
        assert_eq!(p.estado, EstadoPedido::Asignado);
        assert_eq!(p.monto_final_pedido, Some(dec(600)));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_bulk_over_available_is_rejected() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let (proveedor_id, empresa_id) = setup(&pool).await;
        let p = pedido(&pool, proveedor_id, 1000, false, today()).await;
        let d = distribuir(&pool, p.id, empresa_id, 1000).await;

        letras::create(
            &pool,
            CreateLetra {
                distribucion_id: d,
                monto: dec(600),
                fecha_pago: in_days(30),
                numero_unico: None,
                notas: None,
            },
            today(),
        )
        .await
        .expect("letra");

        let result = letras::bulk_create(
            &pool,
            BulkLetras {
                distribucion_id: d,
                montos: vec![dec(300), dec(200)],
                fechas: vec![in_days(60), in_days(90)],
            },
            today(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let dist = distribuciones::get(&pool, d).await.expect("dist").distribucion;
        assert_eq!(dist.monto_en_letras, dec(600));
        assert_eq!(dist.monto_disponible, dec(400));
        assert!(!dist.completado);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_credit_order_completes_when_all_distributions_do() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let (proveedor_id, empresa_id) = setup(&pool).await;
        let p = pedido(&pool, proveedor_id, 1000, false, today()).await;
        let d1 = distribuir(&pool, p.id, empresa_id, 600).await;
        let d2 = distribuir(&pool, p.id, empresa_id, 400).await;

        letras::bulk_create(
            &pool,
            BulkLetras {
                distribucion_id: d1,
                montos: vec![dec(300), dec(300)],
                fechas: vec![in_days(30), in_days(60)],
            },
            today(),
        )
        .await
        .expect("bulk d1");
        assert_eq!(reload(&pool, p.id).await.estado, EstadoPedido::Asignado);

        letras::bulk_create(
            &pool,
            BulkLetras {
                distribucion_id: d2,
                montos: vec![dec(400)],
                fechas: vec![in_days(30)],
            },
            today(),
        )
        .await
        .expect("bulk d2");

        let p = reload(&pool, p.id).await;
        assert_eq!(p.estado, EstadoPedido::Completado);
        assert!(p.completado);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_completed_credit_order_rejects_new_distribution() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let (proveedor_id, empresa_id) = setup(&pool).await;
        let p = pedido(&pool, proveedor_id, 1000, false, today()).await;
        let d = distribuir(&pool, p.id, empresa_id, 1000).await;

        letras::create(
            &pool,
            CreateLetra {
                distribucion_id: d,
                monto: dec(1000),
                fecha_pago: in_days(30),
                numero_unico: None,
                notas: None,
            },
            today(),
        )
        .await
        .expect("letra");
        assert_eq!(reload(&pool, p.id).await.estado, EstadoPedido::Completado);

        let result = distribuciones::create(
            &pool,
            CreateDistribucion {
                pedido_id: p.id,
                empresa_id,
                monto_final: dec(500),
                fecha_distribucion: None,
                notas: None,
            },
            today(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let p = reload(&pool, p.id).await;
        assert_eq!(p.estado, EstadoPedido::Completado);
        assert_eq!(p.monto_final_pedido, Some(dec(1000)));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_completed_credit_order_keeps_its_installments() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let (proveedor_id, empresa_id) = setup(&pool).await;
        let p = pedido(&pool, proveedor_id, 1000, false, today()).await;
        let d = distribuir(&pool, p.id, empresa_id, 1000).await;

        let created = letras::bulk_create(
            &pool,
            BulkLetras {
                distribucion_id: d,
                montos: vec![dec(500), dec(500)],
                fechas: vec![in_days(30), in_days(60)],
            },
            today(),
        )
        .await
        .expect("bulk");
        assert_eq!(reload(&pool, p.id).await.estado, EstadoPedido::Completado);

        let deleted = letras::delete(&pool, created[0].id).await;
        assert!(matches!(deleted, Err(AppError::Conflict(_))));

        let reduced = letras::update(
            &pool,
            created[1].id,
            UpdateLetra {
                monto: Some(dec(100)),
                ..Default::default()
            },
            today(),
        )
        .await;
        assert!(matches!(reduced, Err(AppError::Conflict(_))));

        let dist = distribuciones::get(&pool, d).await.expect("dist").distribucion;
        assert!(dist.completado);
        assert_eq!(dist.monto_en_letras, dec(1000));
        assert!(letras::get(&pool, created[0].id, today()).await.is_ok());
        assert_eq!(reload(&pool, p.id).await.estado, EstadoPedido::Completado);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_final_amount_cannot_drop_below_installments() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let (proveedor_id, empresa_id) = setup(&pool).await;
        let p = pedido(&pool, proveedor_id, 1000, false, today()).await;
        let d = distribuir(&pool, p.id, empresa_id, 1000).await;

        letras::create(
            &pool,
            CreateLetra {
                distribucion_id: d,
                monto: dec(600),
                fecha_pago: in_days(30),
                numero_unico: None,
                notas: None,
            },
            today(),
        )
        .await
        .expect("letra");

        let result = distribuciones::update(
            &pool,
            d,
            UpdateDistribucion {
                monto_final: Some(dec(1)),
                ..Default::default()
            },
        )
        .await;
        match result {
            Err(AppError::Validation(fields)) => assert!(fields.contains("monto_final")),
            other => panic!("expected validation error, got {:?}", other),
        }

        let updated = distribuciones::update(
            &pool,
            d,
            UpdateDistribucion {
                monto_final: Some(dec(600)),
                ..Default::default()
            },
        )
        .await
        .expect("update to allocated amount");
        assert_eq!(updated.monto_disponible, dec(0));
        assert!(updated.completado);
        assert_eq!(reload(&pool, p.id).await.estado, EstadoPedido::Completado);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_deleting_order_removes_its_ledger() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let (proveedor_id, empresa_id) = setup(&pool).await;
        let p = pedido(&pool, proveedor_id, 1000, false, today()).await;
        let d = distribuir(&pool, p.id, empresa_id, 1000).await;
        letras::bulk_create(
            &pool,
            BulkLetras {
                distribucion_id: d,
                montos: vec![dec(400)],
                fechas: vec![in_days(30)],
            },
            today(),
        )
        .await
        .expect("bulk");

        pedidos::delete(&pool, p.id).await.expect("delete");

        let letras_left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM letras WHERE pedido_id = $1")
            .bind(p.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(letras_left, 0);
        assert!(matches!(
            distribuciones::get(&pool, d).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            pedidos::delete(&pool, p.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_cash_order_completes_on_distribution_sum() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let (proveedor_id, empresa_id) = setup(&pool).await;
        let p = pedido(&pool, proveedor_id, 1000, true, today()).await;

        distribuir(&pool, p.id, empresa_id, 500).await;
        assert_eq!(reload(&pool, p.id).await.estado, EstadoPedido::Asignado);

        distribuir(&pool, p.id, empresa_id, 500).await;
        assert_eq!(reload(&pool, p.id).await.estado, EstadoPedido::Completado);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_marking_paid_accrues_on_order() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let (proveedor_id, empresa_id) = setup(&pool).await;
        let p = pedido(&pool, proveedor_id, 1000, false, today()).await;
        let d = distribuir(&pool, p.id, empresa_id, 1000).await;

        let created = letras::bulk_create(
            &pool,
            BulkLetras {
                distribucion_id: d,
                montos: vec![dec(250), dec(750)],
                fechas: vec![in_days(30), in_days(60)],
            },
            today(),
        )
        .await
        .expect("bulk");

        for _ in 0..2 {
            letras::marcar_pagada(&pool, created[0].id, MarcarPagada::default(), today())
                .await
                .expect("pagar");
        }

        let p = reload(&pool, p.id).await;
        assert_eq!(p.monto_pagado, dec(250));
        assert_eq!(p.porcentaje_pagado(), dec(25));

        let letra = letras::get(&pool, created[0].id, today()).await.expect("letra");
        assert_eq!(letra.letra.fecha_pago_real, Some(today()));
        assert!(letra.letra.fecha_vencimiento_gracia.is_some());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_supplier_with_orders_cannot_be_deleted() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let (proveedor_id, _) = setup(&pool).await;
        pedido(&pool, proveedor_id, 1000, false, today()).await;

        let result = proveedores::delete(&pool, proveedor_id).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }
}
