use std::sync::Arc;

use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    prelude::*,
    types::{CallbackQuery, ChatId, LinkPreviewOptions, MessageId, ParseMode},
    utils::command::BotCommands,
};
use tracing::warn;

use crate::config::{Config, ListKind};
use crate::error::BotError;
use crate::filmaffinity::{FilmClient, SearchFilters};
use crate::futbol::StandingsClient;
use crate::pagination::{self, Direction, PageState, ResultRecord, SessionKey};
use crate::store::PageStore;
use crate::watchlist::Watchlist;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Comandos:")]
enum Command {
    #[command(description = "muestra la ayuda", alias = "start")]
    Help(String),
    #[command(description = "lista películas o series")]
    List(String),
    #[command(description = "lista los 10 últimos")]
    Last(String),
    #[command(description = "busca en una lista")]
    Find(String),
    #[command(description = "añade a una lista")]
    Add(String),
    #[command(description = "edita una entrada")]
    Edit(String),
    #[command(description = "borra una entrada")]
    Del(String),
    #[command(description = "busca en FilmAffinity")]
    Film(String),
    #[command(description = "clasificación de fútbol")]
    Futbol(String),
}

pub async fn run(
    bot: Bot,
    cfg: Config,
    films: FilmClient,
    standings: StandingsClient,
    store: PageStore,
) {
    let cfg = Arc::new(cfg);

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter({
                    let cfg = cfg.clone();
                    move |msg: Message| cfg.allowed_chats.contains(&msg.chat.id.0)
                })
                .filter_command::<Command>()
                .endpoint({
                    let cfg = cfg.clone();
                    let films = films.clone();
                    let standings = standings.clone();
                    let store = store.clone();
                    move |bot: Bot, msg: Message, cmd: Command| {
                        let cfg = cfg.clone();
                        let films = films.clone();
                        let standings = standings.clone();
                        let store = store.clone();
                        async move {
                            on_command(bot, msg, cmd, &cfg, &films, &standings, &store).await
                        }
                    }
                }),
        )
        .branch(
            Update::filter_callback_query()
                .filter({
                    let cfg = cfg.clone();
                    move |q: CallbackQuery| {
                        q.message
                            .as_ref()
                            .is_some_and(|m| cfg.allowed_chats.contains(&m.chat().id.0))
                    }
                })
                .endpoint({
                    let films = films.clone();
                    let store = store.clone();
                    move |bot: Bot, q: CallbackQuery| {
                        let films = films.clone();
                        let store = store.clone();
                        async move { on_callback(bot, q, &films, &store).await }
                    }
                }),
        );

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

/* ====== Commands ====== */

async fn on_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    cfg: &Config,
    films: &FilmClient,
    standings: &StandingsClient,
    store: &PageStore,
) -> ResponseResult<()> {
    let chat = msg.chat.id;
    match cmd {
        Command::Help(args) => {
            let text = match args.trim() {
                "nenes" => help_nenes(),
                "film" => help_film(),
                "futbol" | "fútbol" => help_futbol(),
                "" => help_general(),
                _ => "Argumento incorrecto".to_string(),
            };
            send_html(&bot, chat, text).await?;
        }
        Command::List(args) => on_list(&bot, chat, cfg, &args, false).await?,
        Command::Last(args) => on_list(&bot, chat, cfg, &args, true).await?,
        Command::Find(args) => on_find(&bot, chat, cfg, &args).await?,
        Command::Add(args) => on_add(&bot, chat, cfg, &args).await?,
        Command::Edit(args) => on_edit(&bot, chat, cfg, &args).await?,
        Command::Del(args) => on_del(&bot, chat, cfg, &args).await?,
        Command::Film(args) => on_film(&bot, chat, films, store, &args).await?,
        Command::Futbol(args) => on_futbol(&bot, chat, standings, &args).await?,
    }
    Ok(())
}

/// First token is the list selector (`-m`, `-mt`, `-s`, `-st`), the rest
/// is the command payload.
fn split_selector(args: &str) -> (Option<ListKind>, &str) {
    let args = args.trim();
    let (head, rest) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    (ListKind::from_arg(head), rest.trim())
}

/// `/edit` payload: 1-based position then the new title.
fn split_position(rest: &str) -> Option<(usize, &str)> {
    let (pos, title) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let pos = pos.parse().ok()?;
    Some((pos, title.trim()))
}

async fn on_list(
    bot: &Bot,
    chat: ChatId,
    cfg: &Config,
    args: &str,
    last_only: bool,
) -> ResponseResult<()> {
    let (Some(kind), _) = split_selector(args) else {
        return send_html(bot, chat, help_nenes()).await;
    };
    let list = Watchlist::new(cfg.list_path(kind));
    let result = if last_only {
        list.last_ten().await
    } else {
        list.list_all().await
    };
    match result {
        Ok(lines) if lines.is_empty() => {
            bot.send_message(chat, "La lista está vacía.").await?;
        }
        Ok(lines) => {
            bot.send_message(chat, lines.join("\n")).await?;
        }
        Err(e) => report(bot, chat, &e).await?,
    }
    Ok(())
}

async fn on_find(bot: &Bot, chat: ChatId, cfg: &Config, args: &str) -> ResponseResult<()> {
    let (kind, pattern) = split_selector(args);
    let Some(kind) = kind else {
        return send_html(bot, chat, help_nenes()).await;
    };
    if pattern.is_empty() {
        return send_html(bot, chat, help_nenes()).await;
    }
    match Watchlist::new(cfg.list_path(kind)).find(pattern).await {
        Ok(lines) if lines.is_empty() => {
            bot.send_message(chat, "No se ha encontrado.").await?;
        }
        Ok(lines) => {
            bot.send_message(chat, lines.join("\n")).await?;
        }
        Err(e) => report(bot, chat, &e).await?,
    }
    Ok(())
}

async fn on_add(bot: &Bot, chat: ChatId, cfg: &Config, args: &str) -> ResponseResult<()> {
    let (kind, title) = split_selector(args);
    let Some(kind) = kind else {
        return send_html(bot, chat, help_nenes()).await;
    };
    if title.is_empty() {
        return send_html(bot, chat, help_nenes()).await;
    }
    match Watchlist::new(cfg.list_path(kind)).add(title).await {
        Ok(pos) => {
            bot.send_message(chat, format!("{} #{pos} añadida:   {title}", kind.label()))
                .await?;
        }
        Err(e) => report(bot, chat, &e).await?,
    }
    Ok(())
}

async fn on_edit(bot: &Bot, chat: ChatId, cfg: &Config, args: &str) -> ResponseResult<()> {
    let (kind, rest) = split_selector(args);
    let (Some(kind), Some((pos, title))) = (kind, split_position(rest)) else {
        return send_html(bot, chat, help_nenes()).await;
    };
    if title.is_empty() {
        return send_html(bot, chat, help_nenes()).await;
    }
    match Watchlist::new(cfg.list_path(kind)).edit(pos, title).await {
        Ok(()) => {
            bot.send_message(chat, format!("{} #{pos} editada:   {title}", kind.label()))
                .await?;
        }
        Err(e) => report(bot, chat, &e).await?,
    }
    Ok(())
}

async fn on_del(bot: &Bot, chat: ChatId, cfg: &Config, args: &str) -> ResponseResult<()> {
    let (kind, rest) = split_selector(args);
    let Some(kind) = kind else {
        return send_html(bot, chat, help_nenes()).await;
    };
    let list = Watchlist::new(cfg.list_path(kind));

    let result = if rest == "-last" {
        list.delete_last().await
    } else if let Ok(pos) = rest.parse::<usize>() {
        list.delete(pos).await.map(|title| (pos, title))
    } else {
        bot.send_message(
            chat,
            "Error: no me has puesto un número o argumento '-last', perraca!",
        )
        .await?;
        return Ok(());
    };

    match result {
        Ok((pos, title)) => {
            bot.send_message(chat, format!("{} #{pos} borrada:   {title}", kind.label()))
                .await?;
        }
        Err(e) => report(bot, chat, &e).await?,
    }
    Ok(())
}

async fn on_film(
    bot: &Bot,
    chat: ChatId,
    films: &FilmClient,
    store: &PageStore,
    args: &str,
) -> ResponseResult<()> {
    if args.trim().is_empty() {
        return send_html(bot, chat, help_film()).await;
    }
    let (query, filters) = SearchFilters::parse(args);

    match films.search(&query, &filters).await {
        Ok(results) if !results.is_empty() => {
            start_search_session(bot, chat, results, store).await?;
        }
        // zero hits with or without the explicit marker gets the friendly
        // reply, not an error report
        Ok(_) | Err(BotError::NoResults) => {
            bot.send_message(
                chat,
                format!("No se han encontrado resultados. - {query}? me estás vacilando?"),
            )
            .await?;
        }
        Err(e) => {
            bot.send_message(chat, format!("Error al buscar: {e}")).await?;
        }
    }
    Ok(())
}

async fn on_futbol(
    bot: &Bot,
    chat: ChatId,
    standings: &StandingsClient,
    args: &str,
) -> ResponseResult<()> {
    match args.trim() {
        "" => send_html(bot, chat, help_futbol()).await?,
        "clasi" => match standings.fetch_standings().await {
            Ok(table) => {
                send_html(bot, chat, format!("<pre>{table}</pre>")).await?;
            }
            Err(e) => {
                bot.send_message(chat, format!("Error al leer la clasificación: {e}"))
                    .await?;
            }
        },
        "madrid" | "barca" => {
            bot.send_message(chat, "Todavía no disponible.").await?;
        }
        _ => {
            bot.send_message(chat, "No existe esa opción elegida.").await?;
        }
    }
    Ok(())
}

/* ====== Search session controller ====== */

/// Sends page 0 of a fresh result list and persists the session under the
/// new message's key. Reusing a key overwrites the stored state.
async fn start_search_session(
    bot: &Bot,
    chat: ChatId,
    results: Vec<ResultRecord>,
    store: &PageStore,
) -> ResponseResult<()> {
    let mut state = PageState::new(
        SessionKey {
            chat_id: chat.0,
            message_id: 0,
        },
        results,
    );
    let sent = bot
        .send_message(chat, pagination::page_text(&state))
        .parse_mode(ParseMode::Html)
        .reply_markup(pagination::page_keyboard(&state))
        .link_preview_options(no_preview())
        .await?;
    state.key.message_id = sent.id.0;

    if let Err(e) = store.put(&state).await {
        warn!(chat = chat.0, message = sent.id.0, error = %e, "failed to persist search session");
    }
    Ok(())
}

/// Routes inline-button callbacks: `prev` / `next` / `close` / `pick:<n>`.
async fn on_callback(
    bot: Bot,
    q: CallbackQuery,
    films: &FilmClient,
    store: &PageStore,
) -> ResponseResult<()> {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };
    let Some(msg) = q.message.as_ref() else {
        return Ok(());
    };
    let key = SessionKey {
        chat_id: msg.chat().id.0,
        message_id: msg.id().0,
    };

    match data.as_str() {
        "close" => {
            // close queues behind any in-flight page turn on the same
            // key; deleting mid read-modify-write would let the turn's
            // put resurrect the session
            let _guard = store.lock(key).await;
            bot.delete_message(msg.chat().id, msg.id()).await?;
            if let Err(e) = store.delete(key).await {
                warn!(chat = key.chat_id, message = key.message_id, error = %e, "failed to delete search session");
            }
            ack(&bot, &q).await?;
        }
        "prev" => on_navigate(&bot, &q, key, store, Direction::Previous).await?,
        "next" => on_navigate(&bot, &q, key, store, Direction::Next).await?,
        _ => {
            if let Some(token) = data.strip_prefix("pick:") {
                on_pick(&bot, &q, key, token, films, store).await?;
            } else {
                answer_cb(&bot, &q, "Botón desconocido").await?;
            }
        }
    }
    Ok(())
}

async fn on_navigate(
    bot: &Bot,
    q: &CallbackQuery,
    key: SessionKey,
    store: &PageStore,
    dir: Direction,
) -> ResponseResult<()> {
    // serialize the whole read-modify-write; a double-tap waits here
    // instead of losing one of the two updates
    let _guard = store.lock(key).await;

    let Ok(mut state) = load_session(store, key).await else {
        return answer_cb(bot, q, "La búsqueda ha caducado").await;
    };

    match pagination::advance(&state.results, state.current_page, dir) {
        Err(_) => {
            let notice = match dir {
                Direction::Previous => "Ya estás en la primera página",
                Direction::Next => "Ya estás en la última página",
            };
            answer_cb(bot, q, notice).await
        }
        Ok(page) => {
            state.current_page = page;
            if let Err(e) = store.put(&state).await {
                warn!(chat = key.chat_id, message = key.message_id, error = %e, "failed to persist page turn");
            }
            // always edit the same message in place; a new message would
            // orphan the stored session
            bot.edit_message_text(
                ChatId(key.chat_id),
                MessageId(key.message_id),
                pagination::page_text(&state),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(pagination::page_keyboard(&state))
            .link_preview_options(no_preview())
            .await?;
            ack(bot, q).await
        }
    }
}

async fn on_pick(
    bot: &Bot,
    q: &CallbackQuery,
    key: SessionKey,
    token: &str,
    films: &FilmClient,
    store: &PageStore,
) -> ResponseResult<()> {
    let Ok(position) = token.parse::<usize>() else {
        return answer_cb(bot, q, "La búsqueda ha caducado").await;
    };
    let Ok(state) = load_session(store, key).await else {
        return answer_cb(bot, q, "La búsqueda ha caducado").await;
    };
    // a token out of the list's bounds gets the same stale treatment
    let Ok(record) = state.record_at(position) else {
        return answer_cb(bot, q, "La búsqueda ha caducado").await;
    };

    match films.fetch_detail(&record.link).await {
        Ok(detail) => {
            send_html(bot, ChatId(key.chat_id), detail.to_string()).await?;
        }
        Err(e) => {
            bot.send_message(ChatId(key.chat_id), format!("Error al buscar: {e}"))
                .await?;
        }
    }
    ack(bot, q).await
}

/// Absent state means the browsing message outlived its session (closed,
/// or older than the server's store).
async fn load_session(store: &PageStore, key: SessionKey) -> Result<PageState, BotError> {
    match store.get(key).await {
        Ok(Some(state)) => Ok(state),
        Ok(None) => Err(BotError::StaleSession),
        Err(e) => {
            warn!(chat = key.chat_id, message = key.message_id, error = %e, "failed to load search session");
            Err(BotError::StaleSession)
        }
    }
}

/* ====== Helpers ====== */

async fn send_html(bot: &Bot, chat: ChatId, text: impl Into<String>) -> ResponseResult<()> {
    bot.send_message(chat, text)
        .parse_mode(ParseMode::Html)
        .link_preview_options(no_preview())
        .await?;
    Ok(())
}

fn no_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

/// Toast-style acknowledgment on the button itself.
async fn answer_cb(bot: &Bot, q: &CallbackQuery, text: &str) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone())
        .text(text)
        .show_alert(false)
        .await?;
    Ok(())
}

/// Bare acknowledgment so the button stops spinning.
async fn ack(bot: &Bot, q: &CallbackQuery) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

async fn report(bot: &Bot, chat: ChatId, err: &BotError) -> ResponseResult<()> {
    let text = match err {
        BotError::BadPosition(pos) => format!("Error: la película {pos} no existe."),
        BotError::EmptyList => "La lista está vacía.".to_string(),
        other => format!("Error: {other}"),
    };
    bot.send_message(chat, text).await?;
    Ok(())
}

fn help_general() -> String {
    "Menú de ayuda:\n\
     <b>/help</b> | Muestra esta ayuda.\n\n\
     <code><b>/help</b> nenes</code> | Ayuda para los comandos de manejo de pelis/series\n\
     <code><b>/help</b> film</code> | Ayuda para el comando film de FilmAffinity\n\
     <code><b>/help</b> futbol</code> | Ayuda para el comando futbol\n"
        .to_string()
}

fn help_nenes() -> String {
    "<code><b>/list</b></code> | Muestra la lista de películas o series.\n\
     <code><b>/add</b></code> | Añade \"nombre\" en películas o series.\n\
     <code><b>/edit</b></code> | Edita \"nombre\" en película o serie.\n\
     <code><b>/del</b></code> | Borra \"nombre\" en película o serie.\n\
     <code><b>/find</b></code> | Busca \"nombre\" en películas o series.\n\
     <code><b>/last</b></code> | Lista los 10 últimos en películas o series.\n\
     \nArgumentos:   <b><code>-m   -mt   -s   -st</code></b>\n"
        .to_string()
}

fn help_film() -> String {
    "<b>Modo de uso:</b> <code>/film [peli] [opciones]</code>\
     \n\nOpciones:\
     \n        <code>-from [año en formato: aaaa]</code> | Desde el año\
     \n        <code>-to [año en formato: aaaa]</code> | Hasta el año\
     \n        <code>-country [código de dos letras de país]</code> | Según el país\
     \n        <code>-genre [género]</code> | Según el género\
     \n                (accion, animacion, aventuras, ciencia-ficcion,\
     \n                negro, comedia, desconocido, documental, drama,\
     \n                fantastico, infantil, intriga, musical, serie,\
     \n                terror, thriller, western)\
     \n        <code>-orderby [relevance | year]</code> | Ordenar por relevancia o año"
        .to_string()
}

fn help_futbol() -> String {
    "<b>Modo de uso:</b> <code>/futbol [opción]</code>\
     \n\nOpciones:\
     \n        <code>clasi</code> | Muestra la clasificación\
     \n        <code>madrid</code> | Muestra los partidos del Madrid\
     \n        <code>barca</code> | Muestra los partidos del Barça"
        .to_string()
}
