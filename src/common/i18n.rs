// src/common/i18n.rs

use std::collections::HashMap;

const DEFAULT_LANG: &str = "en";

// Catálogo de mensagens de erro por idioma.
#[derive(Debug, Clone)]
pub struct I18nStore {
    // Chave no formato "idioma:chave"
    messages: HashMap<String, &'static str>,
}

impl I18nStore {
    pub fn new() -> Self {
        let entries: [(&str, &str, &str); 16] = [
            ("pt", "validation", "Um ou mais campos são inválidos."),
            ("en", "validation", "One or more fields are invalid."),
            ("pt", "zone_not_found", "Zona não encontrada."),
            ("en", "zone_not_found", "Zone not found."),
            ("pt", "position_not_found", "Posição não encontrada."),
            ("en", "position_not_found", "Position not found."),
            ("pt", "template_not_found", "Modelo não encontrado."),
            ("en", "template_not_found", "Template not found."),
            ("pt", "structural_mismatch", "Nenhuma posição encontrada para clonar."),
            ("en", "structural_mismatch", "No positions found to clone."),
            ("pt", "confirmation_required", "Esta operação exige dupla confirmação."),
            ("en", "confirmation_required", "This operation requires double confirmation."),
            ("pt", "persistence", "Falha ao salvar as alterações. Tente novamente ou descarte."),
            ("en", "persistence", "Saving failed. Retry or discard your changes."),
            ("pt", "internal", "Ocorreu um erro inesperado."),
            ("en", "internal", "An unexpected error occurred."),
        ];

        let messages = entries
            .into_iter()
            .map(|(lang, key, msg)| (format!("{lang}:{key}"), msg))
            .collect();

        Self { messages }
    }

    /// Traduz uma chave; cai para inglês e, por fim, para a própria chave.
    pub fn translate(&self, lang: &str, key: &str) -> String {
        self.messages
            .get(&format!("{lang}:{key}"))
            .or_else(|| self.messages.get(&format!("{DEFAULT_LANG}:{key}")))
            .map(|msg| msg.to_string())
            .unwrap_or_else(|| key.to_string())
    }
}

impl Default for I18nStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_english_for_unknown_language() {
        let store = I18nStore::new();
        assert_eq!(store.translate("de", "zone_not_found"), "Zone not found.");
        assert_eq!(store.translate("pt", "zone_not_found"), "Zona não encontrada.");
        assert_eq!(store.translate("pt", "nope"), "nope");
    }
}
