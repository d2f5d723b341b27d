//! Opponent-name canonicalization.
//!
//! Historical rows and incoming requests spell the same club half a dozen
//! ways ("Nacional", "ATLETICO NACIONAL", "Atlético Nacional", …). Every
//! lookup against the dataset goes through the canonical form so the
//! per-opponent features join correctly.

/// Alias → canonical name, matching the spellings found in the dataset's
/// opponent column.
const TEAM_ALIASES: &[(&str, &str)] = &[
    // Junior
    ("Atlético Junior", "Junior"),
    ("ATLÉTICO JUNIOR", "Junior"),
    ("ATLETICO JUNIOR", "Junior"),
    ("JUNIOR", "Junior"),
    ("JR FC", "Junior"),
    // América
    ("América", "CD América"),
    ("America", "CD América"),
    ("América de Cali", "CD América"),
    ("CD AMÉRICA", "CD América"),
    ("CD AMERICA", "CD América"),
    // Millonarios
    ("MILLONARIOS", "Millonarios"),
    ("co MILLONARIOS", "Millonarios"),
    // Nacional
    ("Nacional", "Atlético Nacional"),
    ("NACIONAL", "Atlético Nacional"),
    ("Atletico Nacional", "Atlético Nacional"),
    // Santa Fe
    ("Santa Fe", "Independiente Santa Fe"),
    ("SANTA FE", "Independiente Santa Fe"),
    ("co SANTA FE", "Independiente Santa Fe"),
    // Tolima
    ("Tolima", "Deportes Tolima"),
    ("TOLIMA", "Deportes Tolima"),
    ("co TOLIMA", "Deportes Tolima"),
    // Medellín
    ("Medellín", "Independiente Medellín"),
    ("Medellin", "Independiente Medellín"),
    ("Independiente", "Independiente Medellín"),
    ("DIM", "Independiente Medellín"),
    // Cali
    ("Cali", "Deportivo Cali"),
    ("AD CALI", "Deportivo Cali"),
    // Pasto
    ("Pasto", "Deportivo Pasto"),
    ("PASTO", "Deportivo Pasto"),
    // Once Caldas
    ("ONCE CALDAS", "Once Caldas"),
    ("co ONCE CALDAS", "Once Caldas"),
    // Alianza
    ("Alianza", "Alianza FC"),
    ("ALIANZA", "Alianza FC"),
    // Pereira
    ("PEREIRA", "Pereira"),
    ("Deportivo Pereira", "Pereira"),
    ("DEPORTIVO PEREIRA", "Pereira"),
    // Bucaramanga
    ("CA BUCARAMANGA", "Bucaramanga"),
    ("Atlético Bucaramanga", "Bucaramanga"),
    ("ATLÉTICO BUCARAMANGA", "Bucaramanga"),
    ("ATLETICO BUCARAMANGA", "Bucaramanga"),
    // Boyacá Chicó
    ("Chicó", "Boyacá Chicó"),
    ("BOYACÁ CHICÓ", "Boyacá Chicó"),
    ("BOYACA CHICO", "Boyacá Chicó"),
    // Envigado
    ("ENVIGADO", "Envigado"),
    // Fortaleza
    ("Fortaleza", "Fortaleza CEIF"),
    ("FORTALEZA FC", "Fortaleza CEIF"),
    // Rionegro
    ("RIONEGRO", "Rionegro"),
    ("Águilas Doradas", "Rionegro"),
    ("ÁGUILAS DORADAS", "Rionegro"),
    ("AGUILAS DORADAS", "Rionegro"),
    // La Equidad
    ("LA EQUIDAD", "La Equidad"),
    // Unión Magdalena
    ("UNIÓN MAGDALENA", "Unión Magdalena"),
    ("UNION MAGDALENA", "Unión Magdalena"),
    // Jaguares
    ("JAGUARES", "Jaguares"),
    // Atlético Huila
    ("ATLÉTICO HUILA", "Atlético Huila"),
    ("ATLETICO HUILA", "Atlético Huila"),
    // Llaneros
    ("LLANEROS", "Llaneros"),
];

/// Canonicalize an opponent name. Tries the name as given, then trimmed;
/// names already in canonical form or not in the table at all are returned
/// unchanged.
pub fn normalize_team_name(name: &str) -> String {
    if let Some(canonical) = lookup(name) {
        return canonical.to_string();
    }
    let trimmed = name.trim();
    if let Some(canonical) = lookup(trimmed) {
        return canonical.to_string();
    }
    name.to_string()
}

fn lookup(name: &str) -> Option<&'static str> {
    TEAM_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
}
