// Static CEAP reference knowledge.
//
// The CEAP (Cota para o Exercício da Atividade Parlamentar) rules do not
// live in the expense store; questions about what the quota covers or the
// per-state monthly ceiling are answered from this fixed document instead
// of a query.

use serde_json::{json, Value};

const RULES: &[&str] = &[
    "A CEAP (Cota para o Exercício da Atividade Parlamentar) reembolsa despesas \
     do mandato mediante comprovação por documento fiscal.",
    "O valor mensal varia por estado do deputado, refletindo o custo de \
     deslocamento entre Brasília e o estado de origem.",
    "A cota cobre passagens aéreas, telefonia, serviços postais, manutenção de \
     escritório de apoio, publicidade da atividade parlamentar, combustíveis, \
     locação de veículos, hospedagem e alimentação.",
    "Saldo não utilizado em um mês não acumula para os meses seguintes no \
     mesmo exercício além dos limites regulamentares.",
    "Despesas são ressarcidas pelo valor líquido: o valor do documento menos \
     eventuais glosas.",
];

const PROHIBITIONS: &[&str] = &[
    "Despesas de caráter pessoal, sem vínculo com o exercício do mandato.",
    "Contratação de empresa pertencente ao próprio deputado ou a parente até \
     o terceiro grau.",
    "Aquisição de bens permanentes.",
    "Despesas em período de suspensão do exercício do mandato.",
];

/// Monthly ceiling in BRL per state of origin. Distance from Brasília
/// drives the spread between entries.
const STATE_LIMITS: &[(&str, f64)] = &[
    ("AC", 44632.46),
    ("AL", 40944.10),
    ("AM", 43570.12),
    ("AP", 43374.78),
    ("BA", 39010.85),
    ("CE", 42451.77),
    ("DF", 30788.66),
    ("ES", 37423.91),
    ("GO", 35507.06),
    ("MA", 42151.69),
    ("MG", 36092.71),
    ("MS", 40542.84),
    ("MT", 39428.03),
    ("PA", 42227.45),
    ("PB", 42032.56),
    ("PE", 41676.80),
    ("PI", 40971.77),
    ("PR", 38871.86),
    ("RJ", 35759.97),
    ("RN", 42731.99),
    ("RO", 43672.49),
    ("RR", 45612.53),
    ("RS", 40875.90),
    ("SC", 39877.78),
    ("SE", 40139.26),
    ("SP", 37012.49),
    ("TO", 39503.61),
];

fn limits_json() -> Value {
    Value::Object(
        STATE_LIMITS
            .iter()
            .map(|(uf, limit)| (uf.to_string(), json!(limit)))
            .collect(),
    )
}

fn full_document() -> Value {
    json!({
        "rules": RULES,
        "monthly_limits_brl": limits_json(),
        "prohibitions": PROHIBITIONS,
    })
}

/// Answer a CEAP reference question. An unknown topic falls back to the
/// full document rather than an error, so the model always has something
/// to ground its answer on.
pub fn cota_info(topic: Option<&str>, state: Option<&str>) -> Value {
    if let Some(uf) = state {
        let uf = uf.to_uppercase();
        let entry = STATE_LIMITS.iter().find(|(s, _)| *s == uf);
        return match entry {
            Some((uf, limit)) => json!({ "state": uf, "monthly_limit_brl": limit }),
            None => json!({
                "error": format!("unknown state '{}'", uf),
                "monthly_limits_brl": limits_json(),
            }),
        };
    }

    let topic = match topic {
        Some(t) => t.to_lowercase(),
        None => return full_document(),
    };

    if topic.contains("regra") || topic.contains("rule") || topic.contains("cobre") {
        json!({ "rules": RULES })
    } else if topic.contains("limite")
        || topic.contains("limit")
        || topic.contains("valor")
        || topic.contains("teto")
    {
        json!({ "monthly_limits_brl": limits_json() })
    } else if topic.contains("proib") || topic.contains("veda") || topic.contains("prohib") {
        json!({ "prohibitions": PROHIBITIONS })
    } else {
        full_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_lookup_case_insensitive() {
        let result = cota_info(None, Some("sp"));
        assert_eq!(result["state"], "SP");
        assert_eq!(result["monthly_limit_brl"], 37012.49);
    }

    #[test]
    fn test_unknown_state_returns_table_not_panic() {
        let result = cota_info(None, Some("XX"));
        assert!(result["error"].as_str().unwrap().contains("XX"));
        assert!(result["monthly_limits_brl"]["SP"].is_number());
    }

    #[test]
    fn test_topic_narrows_to_prohibitions() {
        let result = cota_info(Some("o que é proibido"), None);
        assert!(result["prohibitions"].is_array());
        assert!(result.get("rules").is_none());
    }

    #[test]
    fn test_unknown_topic_falls_back_to_full_document() {
        let result = cota_info(Some("qual o sentido da vida"), None);
        assert!(result["rules"].is_array());
        assert!(result["prohibitions"].is_array());
        assert!(result["monthly_limits_brl"].is_object());
    }

    #[test]
    fn test_every_brazilian_uf_present() {
        let result = cota_info(Some("limites"), None);
        assert_eq!(result["monthly_limits_brl"].as_object().unwrap().len(), 27);
    }
}
