//! Built-in sources
//!
//! Registration order here is the order of every report. Each source's
//! `AGROADB_<SOURCE>_URL` override replaces the base URL of its primary
//! strategy; fallbacks keep their public endpoints.

use crate::cache::LookupCache;
use crate::config::LookupConfig;
use crate::descriptor::{SourceCategory, SourceDescriptor};
use crate::errors::{CatalogError, NormalizationError};
use crate::executor::FallbackExecutor;
use crate::http::{Credential, HttpStrategy, ResponseFormat, ScrapeRule};
use crate::normalizer::{
    array_at, digits_only, first_str, first_value, parse_decimal, require_array, require_str,
    Payload, PayloadBuilder,
};
use crate::orchestrator::AggregateOrchestrator;
use crate::registry::SourceRegistry;
use agroadb_data::SubjectKind;
use agroadb_resilience::RateLimitConfig;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub const RECEITA_CNPJ: &str = "receita_cnpj";
pub const RECEITA_CPF: &str = "receita_cpf";
pub const CAR_SICAR: &str = "car_sicar";
pub const INCRA_SIGEF: &str = "incra_sigef";
pub const DATAJUD: &str = "datajud";
pub const IBAMA_EMBARGOS: &str = "ibama_embargos";
pub const CEIS_SANCOES: &str = "ceis_sancoes";
pub const SERASA: &str = "serasa";

/// Every built-in source, in report order
pub const SOURCE_NAMES: [&str; 8] = [
    RECEITA_CNPJ,
    RECEITA_CPF,
    CAR_SICAR,
    INCRA_SIGEF,
    DATAJUD,
    IBAMA_EMBARGOS,
    CEIS_SANCOES,
    SERASA,
];

/// Register the built-in sources against `config`
pub fn build_registry(config: &LookupConfig) -> Result<SourceRegistry, CatalogError> {
    let client = config.http_client()?;
    let mut registry = SourceRegistry::new();

    registry.register(receita_cnpj(config, &client)?)?;
    registry.register(receita_cpf(config, &client)?)?;
    registry.register(car_sicar(config, &client)?)?;
    registry.register(incra_sigef(config, &client)?)?;
    registry.register(datajud(config, &client)?)?;
    registry.register(ibama_embargos(config, &client)?)?;
    registry.register(ceis_sancoes(config, &client)?)?;
    registry.register(serasa(config, &client)?)?;

    let missing: Vec<&str> = registry
        .list_sources(None)
        .into_iter()
        .filter(|d| d.requires_credentials() && config.token(d.name()).is_none())
        .map(|d| d.name())
        .collect();
    info!(
        sources = registry.len(),
        without_credentials = ?missing,
        "Source catalog loaded"
    );

    Ok(registry)
}

/// Frozen catalog wired with executor, cache and deadline from `config`
pub fn build_orchestrator(config: &LookupConfig) -> Result<AggregateOrchestrator, CatalogError> {
    let registry = build_registry(config)?.freeze();
    let executor = FallbackExecutor::new(config.retry.clone());

    let mut orchestrator =
        AggregateOrchestrator::new(registry, executor).with_default_timeout(config.timeout);
    if config.cache_enabled() {
        orchestrator = orchestrator.with_cache(Arc::new(LookupCache::new(
            config.cache_capacity,
            config.cache_ttl,
        )));
    }
    Ok(orchestrator)
}

fn scrape_rule(field: &str, pattern: &str) -> Result<ScrapeRule, CatalogError> {
    ScrapeRule::new(field, pattern).map_err(|e| CatalogError::Pattern {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn receita_cnpj(config: &LookupConfig, client: &Client) -> Result<SourceDescriptor, CatalogError> {
    let base = config.base_url(RECEITA_CNPJ, "https://brasilapi.com.br");
    Ok(SourceDescriptor::builder(RECEITA_CNPJ, normalize_cnpj)
        .display_name("Receita Federal - CNPJ")
        .category(SourceCategory::TaxRegistry)
        .subject_kinds(&[SubjectKind::Cnpj])
        .rate_limit(RateLimitConfig::public_mirror())
        .strategy(Arc::new(HttpStrategy::get(
            "brasilapi",
            client.clone(),
            format!("{}/api/cnpj/v1/{{document}}", base),
        )))
        .strategy(Arc::new(HttpStrategy::get(
            "receitaws",
            client.clone(),
            "https://receitaws.com.br/v1/cnpj/{document}",
        )))
        .strategy(Arc::new(HttpStrategy::get(
            "cnpjws",
            client.clone(),
            "https://publica.cnpj.ws/cnpj/{document}",
        )))
        .build()?)
}

fn receita_cpf(config: &LookupConfig, client: &Client) -> Result<SourceDescriptor, CatalogError> {
    let base = config.base_url(RECEITA_CPF, "https://gateway.apiserpro.serpro.gov.br");
    Ok(SourceDescriptor::builder(RECEITA_CPF, normalize_cpf)
        .display_name("Receita Federal - CPF (SERPRO)")
        .category(SourceCategory::TaxRegistry)
        .subject_kinds(&[SubjectKind::Cpf])
        .requires_credentials(true)
        .rate_limit(RateLimitConfig::contracted_api())
        .strategy(Arc::new(
            HttpStrategy::get(
                "serpro",
                client.clone(),
                format!("{}/consulta-cpf-df/v1/cpf/{{document}}", base),
            )
            .with_credential(Credential::bearer(config.token(RECEITA_CPF))),
        ))
        .build()?)
}

fn car_sicar(config: &LookupConfig, client: &Client) -> Result<SourceDescriptor, CatalogError> {
    let base = config.base_url(CAR_SICAR, "https://consultapublica.car.gov.br/publico");
    let rules = vec![
        scrape_rule("codigo_imovel", r#"(?s)C[oó]digo do im[oó]vel.*?<td[^>]*>(.*?)</td>"#)?,
        scrape_rule("situacao", r#"(?s)Situa[cç][aã]o.*?<td[^>]*>(.*?)</td>"#)?,
        scrape_rule("area", r#"(?s)[AÁ]rea \(ha\).*?<td[^>]*>(.*?)</td>"#)?,
        scrape_rule("municipio", r#"(?s)Munic[ií]pio.*?<td[^>]*>(.*?)</td>"#)?,
    ];

    Ok(SourceDescriptor::builder(CAR_SICAR, normalize_car)
        .display_name("CAR / SICAR")
        .category(SourceCategory::Environmental)
        .rate_limit(RateLimitConfig::government_api())
        .strategy(Arc::new(HttpStrategy::get(
            "sicar_api",
            client.clone(),
            format!("{}/imoveis/search?cpfCnpj={{document}}", base),
        )))
        .strategy(Arc::new(
            HttpStrategy::get(
                "sicar_consulta_publica",
                client.clone(),
                "https://consultapublica.car.gov.br/publico/imoveis/index?cpfCnpj={document_formatted}",
            )
            .with_format(ResponseFormat::Html(rules)),
        ))
        .build()?)
}

fn incra_sigef(config: &LookupConfig, client: &Client) -> Result<SourceDescriptor, CatalogError> {
    let base = config.base_url(INCRA_SIGEF, "https://sigef.incra.gov.br");
    Ok(SourceDescriptor::builder(INCRA_SIGEF, normalize_sigef)
        .display_name("INCRA / SIGEF")
        .category(SourceCategory::LandRegistry)
        .rate_limit(RateLimitConfig::government_api())
        .strategy(Arc::new(HttpStrategy::get(
            "sigef_api",
            client.clone(),
            format!("{}/api/parcelas/?cpf_cnpj={{document}}", base),
        )))
        .build()?)
}

fn datajud(config: &LookupConfig, client: &Client) -> Result<SourceDescriptor, CatalogError> {
    let base = config.base_url(
        DATAJUD,
        "https://api-publica.datajud.cnj.jus.br/api_publica_tjsp",
    );
    let query = json!({
        "size": 50,
        "query": {"match": {"partes.documento": "{document}"}}
    });

    Ok(SourceDescriptor::builder(DATAJUD, normalize_datajud)
        .display_name("CNJ DataJud")
        .category(SourceCategory::Judicial)
        .requires_credentials(true)
        .rate_limit(RateLimitConfig::government_api())
        .strategy(Arc::new(
            HttpStrategy::post_json(
                "datajud_search",
                client.clone(),
                format!("{}/_search", base),
                query,
            )
            .with_credential(
                Credential::header("Authorization", config.token(DATAJUD)).with_scheme("APIKey"),
            ),
        ))
        .build()?)
}

fn ibama_embargos(config: &LookupConfig, client: &Client) -> Result<SourceDescriptor, CatalogError> {
    let base = config.base_url(
        IBAMA_EMBARGOS,
        "https://servicos.ibama.gov.br/ctf/publico/areasembargadas",
    );
    Ok(SourceDescriptor::builder(IBAMA_EMBARGOS, normalize_embargos)
        .display_name("IBAMA - Areas embargadas")
        .category(SourceCategory::Environmental)
        .rate_limit(RateLimitConfig::government_api())
        .strategy(Arc::new(HttpStrategy::get(
            "ibama_api",
            client.clone(),
            format!("{}/api/embargos?cpfCnpj={{document}}", base),
        )))
        .build()?)
}

fn ceis_sancoes(config: &LookupConfig, client: &Client) -> Result<SourceDescriptor, CatalogError> {
    let base = config.base_url(CEIS_SANCOES, "https://api.portaldatransparencia.gov.br");
    Ok(SourceDescriptor::builder(CEIS_SANCOES, normalize_sanctions)
        .display_name("CGU - CEIS")
        .category(SourceCategory::Sanctions)
        .requires_credentials(true)
        .rate_limit(RateLimitConfig::government_api())
        .strategy(Arc::new(
            HttpStrategy::get(
                "transparencia_api",
                client.clone(),
                format!(
                    "{}/api-de-dados/ceis?codigoSancionado={{document}}&pagina=1",
                    base
                ),
            )
            .with_header("Accept", "application/json")
            .with_credential(Credential::header("chave-api-dados", config.token(CEIS_SANCOES))),
        ))
        .build()?)
}

fn serasa(config: &LookupConfig, client: &Client) -> Result<SourceDescriptor, CatalogError> {
    let base = config.base_url(SERASA, "https://api.serasaexperian.com.br");
    Ok(SourceDescriptor::builder(SERASA, normalize_credit)
        .display_name("Serasa Experian - Score")
        .category(SourceCategory::Credit)
        .requires_credentials(true)
        .rate_limit(RateLimitConfig::contracted_api())
        .strategy(Arc::new(
            HttpStrategy::get(
                "serasa_score",
                client.clone(),
                format!("{}/credit/v1/score/{{kind}}/{{document}}", base),
            )
            .with_credential(Credential::bearer(config.token(SERASA))),
        ))
        .build()?)
}

// Normalizers

/// BrasilAPI, ReceitaWS and CNPJ.ws company records
pub fn normalize_cnpj(raw: &Value) -> Result<Payload, NormalizationError> {
    // ReceitaWS answers 200 with an error body for unknown or invalid ids
    if first_str(raw, &["status"]).as_deref() == Some("ERROR") {
        let message = first_str(raw, &["message"]).unwrap_or_else(|| "error status".into());
        return Err(NormalizationError::UnexpectedShape(message));
    }

    let partners: Vec<Value> = array_at(raw, &["qsa", "socios"])
        .iter()
        .filter_map(|p| first_str(p, &["nome_socio", "nome"]))
        .map(Value::String)
        .collect();

    Ok(PayloadBuilder::new()
        .insert_opt(
            "document",
            first_str(raw, &["cnpj", "estabelecimento.cnpj"]).map(|d| digits_only(&d)),
        )
        .insert("name", require_str(raw, "name", &["razao_social", "nome"])?)
        .insert_opt(
            "trade_name",
            first_str(raw, &["nome_fantasia", "fantasia", "estabelecimento.nome_fantasia"]),
        )
        .insert_opt(
            "status",
            first_str(
                raw,
                &[
                    "descricao_situacao_cadastral",
                    "situacao",
                    "estabelecimento.situacao_cadastral",
                ],
            ),
        )
        .insert_opt(
            "opened_at",
            first_str(
                raw,
                &["data_inicio_atividade", "abertura", "estabelecimento.data_inicio_atividade"],
            ),
        )
        .insert_opt(
            "main_activity",
            first_str(
                raw,
                &[
                    "cnae_fiscal_descricao",
                    "atividade_principal.0.text",
                    "estabelecimento.atividade_principal.descricao",
                ],
            ),
        )
        .insert_opt(
            "city",
            first_str(raw, &["municipio", "estabelecimento.cidade.nome"]),
        )
        .insert_opt("state", first_str(raw, &["uf", "estabelecimento.estado.sigla"]))
        .insert_opt(
            "share_capital",
            first_value(raw, &["capital_social"]).and_then(parse_decimal),
        )
        .insert("partners", partners)
        .build())
}

/// SERPRO Consulta CPF
pub fn normalize_cpf(raw: &Value) -> Result<Payload, NormalizationError> {
    Ok(PayloadBuilder::new()
        .insert_opt("document", first_str(raw, &["ni", "cpf"]).map(|d| digits_only(&d)))
        .insert("name", require_str(raw, "name", &["nome"])?)
        .insert_opt("status", first_str(raw, &["situacao.descricao", "situacao"]))
        .insert_opt("birth_date", first_str(raw, &["nascimento", "data_nascimento"]))
        .build())
}

/// SICAR JSON listing or the scraped consulta pública page
pub fn normalize_car(raw: &Value) -> Result<Payload, NormalizationError> {
    let property = |p: &Value| {
        json!({
            "car_code": first_str(p, &["codigo", "codigo_imovel", "cod_imovel"]),
            "status": first_str(p, &["status", "situacao", "des_condicao"]),
            "area_ha": first_value(p, &["area", "num_area", "area_ha"]).and_then(parse_decimal),
            "city": first_str(p, &["municipio", "nom_municipio"]),
            "state": first_str(p, &["uf", "cod_estado"]),
        })
    };

    let properties: Vec<Value> = if first_str(raw, &["codigo_imovel"]).is_some() {
        vec![property(raw)]
    } else {
        require_array(raw, &["imoveis", "features", "data"])?
            .iter()
            .map(|item| property(item.get("properties").unwrap_or(item)))
            .collect()
    };

    let total_area: f64 = properties
        .iter()
        .filter_map(|p| p["area_ha"].as_f64())
        .sum();

    Ok(PayloadBuilder::new()
        .insert("property_count", properties.len())
        .insert("total_area_ha", total_area)
        .insert("properties", properties)
        .build())
}

/// SIGEF certified parcels
pub fn normalize_sigef(raw: &Value) -> Result<Payload, NormalizationError> {
    let parcels: Vec<Value> = require_array(raw, &["parcelas", "results", "data"])?
        .iter()
        .map(|p| {
            json!({
                "parcel_code": first_str(p, &["codigo", "parcela_codigo", "codigo_parcela"]),
                "name": first_str(p, &["denominacao", "nome_area"]),
                "area_ha": first_value(p, &["area_ha", "area"]).and_then(parse_decimal),
                "city": first_str(p, &["municipio"]),
                "status": first_str(p, &["situacao", "status"]),
            })
        })
        .collect();

    Ok(PayloadBuilder::new()
        .insert("parcel_count", parcels.len())
        .insert("parcels", parcels)
        .build())
}

/// DataJud Elasticsearch response
pub fn normalize_datajud(raw: &Value) -> Result<Payload, NormalizationError> {
    let hits = require_array(raw, &["hits.hits"])?;
    let lawsuits: Vec<Value> = hits
        .iter()
        .map(|hit| {
            let source = hit.get("_source").unwrap_or(hit);
            let subjects: Vec<String> = array_at(source, &["assuntos"])
                .iter()
                .filter_map(|a| first_str(a, &["nome"]))
                .collect();
            json!({
                "number": first_str(source, &["numeroProcesso"]),
                "court": first_str(source, &["tribunal"]),
                "class": first_str(source, &["classe.nome"]),
                "filed_at": first_str(source, &["dataAjuizamento"]),
                "subjects": subjects,
            })
        })
        .collect();

    let total = first_value(raw, &["hits.total.value", "hits.total"])
        .and_then(Value::as_u64)
        .unwrap_or(lawsuits.len() as u64);

    Ok(PayloadBuilder::new()
        .insert("total", total)
        .insert("lawsuits", lawsuits)
        .build())
}

/// IBAMA embargoed areas
pub fn normalize_embargos(raw: &Value) -> Result<Payload, NormalizationError> {
    let embargoes: Vec<Value> = require_array(raw, &["data", "embargos", "resultado"])?
        .iter()
        .map(|e| {
            json!({
                "term_number": first_str(e, &["numero_tad", "num_tad", "numeroTermo"]),
                "embargoed_at": first_str(e, &["data_embargo", "dat_embargo", "dataEmbargo"]),
                "city": first_str(e, &["municipio", "nom_municipio"]),
                "state": first_str(e, &["uf", "sig_uf"]),
                "area_ha": first_value(e, &["area_embargada", "qtd_area_embargada"]).and_then(parse_decimal),
                "description": first_str(e, &["descricao_infracao", "des_infracao"]),
            })
        })
        .collect();

    Ok(PayloadBuilder::new()
        .insert("has_embargo", !embargoes.is_empty())
        .insert("embargo_count", embargoes.len())
        .insert("embargoes", embargoes)
        .build())
}

/// Portal da Transparência CEIS
pub fn normalize_sanctions(raw: &Value) -> Result<Payload, NormalizationError> {
    let sanctions: Vec<Value> = require_array(raw, &["data"])?
        .iter()
        .map(|s| {
            json!({
                "type": first_str(s, &["tipoSancao.descricaoResumida", "tipoSancao.descricaoPortal"]),
                "authority": first_str(s, &["orgaoSancionador.nome"]),
                "starts_at": first_str(s, &["dataInicioSancao"]),
                "ends_at": first_str(s, &["dataFimSancao"]),
                "process": first_str(s, &["numeroProcesso"]),
            })
        })
        .collect();

    Ok(PayloadBuilder::new()
        .insert("sanctioned", !sanctions.is_empty())
        .insert("sanction_count", sanctions.len())
        .insert("sanctions", sanctions)
        .build())
}

/// Credit score
pub fn normalize_credit(raw: &Value) -> Result<Payload, NormalizationError> {
    let score = first_value(raw, &["score.valor", "score", "pontuacao"])
        .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
        .ok_or_else(|| NormalizationError::MissingField("score".into()))?;

    let negative_records = first_value(raw, &["pendencias.quantidade", "negativacoes.total"])
        .and_then(Value::as_u64)
        .unwrap_or_else(|| array_at(raw, &["pendencias", "negativacoes"]).len() as u64);

    Ok(PayloadBuilder::new()
        .insert("score", score)
        .insert_opt("risk_band", first_str(raw, &["faixa", "classe_risco"]))
        .insert("negative_records", negative_records)
        .build())
}
