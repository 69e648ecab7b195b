//src/main.rs

use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// Declaração dos nossos módulos
mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Roda as migrações do SQLx na inicialização
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Falha ao rodar as migrações do banco de dados.");

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    let finance_routes = Router::new()
        .route("/titles"
               ,post(handlers::finance::create_title)
               .get(handlers::finance::list_titles)
        )
        .route("/titles/{id}/audit"
               ,get(handlers::finance::title_audit_trail)
        )
        .route("/titles/{id}/cancel"
               ,post(handlers::finance::cancel_title)
        )
        .route("/titles/{id}/payments"
               ,post(handlers::finance::record_payment)
        )
        .route("/payments/{id}/void"
               ,post(handlers::finance::void_payment)
        )
        .route("/reports/aging"
               ,get(handlers::finance::aging_report)
        )
        .route("/transactions"
               ,get(handlers::finance::list_transactions)
        )
        .route("/budget-items"
               ,post(handlers::finance::create_budget_item)
        );

    let commission_routes = Router::new()
        .route("/rules"
               ,post(handlers::commission::create_rule)
               .get(handlers::commission::list_rules)
        )
        .route("/provisions"
               ,get(handlers::commission::list_provisions)
        )
        .route("/provisions/accrue"
               ,post(handlers::commission::accrue)
        )
        .route("/provisions/{id}/approve"
               ,post(handlers::commission::approve_provision)
        )
        .route("/provisions/{id}/pay"
               ,post(handlers::commission::pay_provision)
        )
        .route("/provisions/{id}/cancel"
               ,post(handlers::commission::cancel_provision)
        )
        .route("/advances"
               ,post(handlers::commission::grant_advance)
        )
        .route("/advances/{professionalId}"
               ,get(handlers::commission::list_advances)
        )
        .route("/remuneration"
               ,put(handlers::commission::upsert_remuneration)
        );

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/finance", finance_routes)
        .nest("/api/commissions", commission_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .with_state(app_state);

    // Inicia o servidor
    let addr = "0.0.0.0:3000";
    let listener = TcpListener::bind(addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .await
        .expect("Erro no servidor Axum");
}
