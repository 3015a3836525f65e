/// Prompt asking the text model for the JSON shape read by [`crate::normalize`].
pub fn etymology_prompt(word: &str) -> String {
    format!(
        r#"Analise a etimologia da palavra "{word}" em português de forma detalhada e acadêmica.

Por favor, forneça as seguintes informações em formato JSON:

{{
  "word": "{word}",
  "etymology": {{
    "origin": "idioma de origem (latim, grego, etc.)",
    "originalForm": "forma original da palavra",
    "meaning": "significado original",
    "evolution": "como a palavra evoluiu até o português"
  }},
  "morphology": {{
    "prefix": "prefixo (se houver)",
    "root": "raiz principal",
    "suffix": "sufixo (se houver)",
    "explanation": "explicação da formação morfológica"
  }},
  "relatedWords": [
    {{
      "word": "palavra relacionada",
      "relationship": "tipo de relação (cognato, derivada, etc.)",
      "explanation": "breve explicação da relação"
    }}
  ],
  "historicalContext": "contexto histórico e cultural da palavra",
  "curiosities": [
    "curiosidade interessante sobre a palavra"
  ]
}}

Seja preciso e academicamente correto. Se não tiver certeza de alguma informação, indique isso claramente."#
    )
}

const ILLUSTRATION_STYLE: &str = "Style: Renaissance manuscript illumination with parchment background, golden ornaments, and medieval aesthetic.
The image should be elegant, scholarly, and evoke ancient wisdom and knowledge.
Include decorative borders and elements that reflect the historical origins of the word.
Colors: warm browns, deep reds (#8b0000), gold accents, aged parchment tones.

Make it suitable for an educational etymology application with a classic, timeless feel.";

/// Illustration prompt for the image model. `etymology` adds a context line.
pub fn illustration_prompt(word: &str, etymology: Option<&str>) -> String {
    let mut prompt = format!(
        "Create a beautiful, artistic illustration representing the word \"{word}\" and its etymological origins.\n\n"
    );
    if let Some(context) = etymology.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("Context: ");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }
    prompt.push_str(ILLUSTRATION_STYLE);
    prompt
}
