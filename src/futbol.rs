use std::fmt;

use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::config::{HTTP_TIMEOUT, USER_AGENT};
use crate::error::BotError;

const STANDINGS_URL: &str = "https://resultados.as.com/resultados/futbol/primera/clasificacion/";

static SEL_TEAM_HEADER: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("th[scope=\"row\"].cont-nombre-equipo").expect("static selector")
});
static SEL_TEAM_NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span[itemprop=\"name\"]").expect("static selector"));

/// Long club names abbreviated so the table fits a phone screen.
fn short_name(name: &str) -> &str {
    match name {
        "Real Madrid" => "RMA",
        "Barcelona" => "FCB",
        "Atlético" => "ATL",
        "Sevilla" => "SEV",
        "Betis" => "BET",
        "R. Sociedad" => "RSO",
        "Villarreal" => "VIL",
        "Athletic" => "ATH",
        "Valencia" => "VAL",
        "Osasuna" => "OSA",
        "Celta" => "CEL",
        "Rayo" => "RAY",
        "Elche" => "ELC",
        "Espanyol" => "ESP",
        "Getafe" => "GET",
        "Mallorca" => "MLL",
        "Cádiz" => "CAD",
        "Granada" => "GRA",
        "Levante" => "LEV",
        "Alavés" => "ALA",
        "Almería" => "ALM",
        "Valladolid" => "VLL",
        other => other,
    }
}

/// One classification row: points, played, won, drawn, lost, goals
/// for/against, as shown on the results site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRow {
    pub name: String,
    pub stats: [String; 7],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standings {
    pub teams: Vec<TeamRow>,
}

impl fmt::Display for Standings {
    /// Fixed-width table for a `<pre>` block, with divider lines at the
    /// Champions / Europa / Conference / relegation cut-offs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " # tea pt pj pg pe pp gf gc")?;
        writeln!(f, "============================")?;
        for (i, row) in self.teams.iter().enumerate() {
            let pos = i + 1;
            if matches!(pos, 5 | 7 | 8 | 18) {
                writeln!(f, "----------------------------")?;
            }
            write!(f, "{:>2} {:3} ", pos, row.name)?;
            for stat in &row.stats {
                write!(f, "{stat:>2} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct StandingsClient {
    http: Client,
    url: String,
}

impl StandingsClient {
    pub fn new() -> Result<Self, BotError> {
        Ok(Self {
            http: Client::builder()
                .timeout(HTTP_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()?,
            url: STANDINGS_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_url(url: impl Into<String>) -> Result<Self, BotError> {
        let mut client = Self::new()?;
        client.url = url.into();
        Ok(client)
    }

    pub async fn fetch_standings(&self) -> Result<Standings, BotError> {
        let resp = self.http.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(BotError::Status {
                status: resp.status(),
                url: self.url.clone(),
            });
        }
        let html = resp.text().await?;
        parse_standings(&html)
    }
}

fn cell_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_standings(html: &str) -> Result<Standings, BotError> {
    let doc = Html::parse_document(html);
    let mut teams = Vec::new();

    for header in doc.select(&SEL_TEAM_HEADER) {
        let Some(name_el) = header.select(&SEL_TEAM_NAME).next() else {
            continue;
        };
        let name = short_name(&cell_text(&name_el)).to_string();

        // the seven stat cells follow the name header inside the same row
        let mut stats: Vec<String> = Vec::with_capacity(7);
        for sibling in header.next_siblings() {
            if stats.len() == 7 {
                break;
            }
            if let Some(el) = ElementRef::wrap(sibling) {
                if el.value().name() == "td" {
                    stats.push(cell_text(&el));
                }
            }
        }
        let Ok(stats) = <[String; 7]>::try_from(stats) else {
            continue;
        };
        teams.push(TeamRow { name, stats });
    }

    if teams.is_empty() {
        return Err(BotError::NoResults);
    }
    Ok(Standings { teams })
}
