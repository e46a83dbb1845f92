use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rolodex::config::{self, Config};
use rolodex::{
    AssignmentReport, Contact, ContactDetails, ContactId, Database, Directory, DirectoryError,
    ListContactsOptions, Store, Tag, TagDraft, TagId,
};
use serde::Serialize;

/// rolodex - contact directory with lockable hashtags
#[derive(Parser)]
#[command(name = "rolodex")]
#[command(about = "A contact directory with searchable, lockable hashtags")]
#[command(version)]
struct Cli {
    /// SQLite database file (default: $ROLODEX_DB, then the user data directory)
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List contacts, optionally searched and sorted
    List(ListCommand),
    /// Show a single contact
    Show(ShowCommand),
    /// Add a new contact
    Add(AddCommand),
    /// Edit a contact; omitted fields keep their value
    Edit(EditCommand),
    /// Delete a contact
    Delete(DeleteCommand),
    /// Assign an active tag to contacts
    Assign(BulkTagCommand),
    /// Remove a tag from contacts
    Unassign(BulkTagCommand),
    /// Manage tags
    #[command(subcommand)]
    Tag(TagCommands),
}

#[derive(Parser)]
struct ListCommand {
    /// Search term; start with '#' to match contacts holding all given tags
    #[arg(short, long, value_name = "TERM")]
    search: Option<String>,

    /// Sort key: vorname, nachname, firma or adresse
    #[arg(long, value_name = "KEY")]
    sort: Option<String>,

    /// Sort direction: asc or desc
    #[arg(long, value_name = "DIR")]
    dir: Option<String>,

    /// Only contacts in this city
    #[arg(long, value_name = "CITY", conflicts_with_all = ["search", "sort", "dir"])]
    city: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct ShowCommand {
    id: i64,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct DeleteCommand {
    id: i64,
}

/// Optional contact fields; an empty value clears the field.
#[derive(Args, Default)]
struct OptionalFields {
    #[arg(long)]
    salutation: Option<String>,
    #[arg(long, value_name = "PHONE")]
    phone: Option<String>,
    #[arg(long, value_name = "PHONE")]
    phone2: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    note: Option<String>,
}

impl OptionalFields {
    fn apply(&self, details: &mut ContactDetails) {
        let fields = [
            (&self.salutation, &mut details.salutation),
            (&self.phone, &mut details.phone_primary),
            (&self.phone2, &mut details.phone_secondary),
            (&self.email, &mut details.email),
            (&self.company, &mut details.company),
            (&self.note, &mut details.note),
        ];
        for (given, target) in fields {
            if let Some(value) = given {
                *target = Some(value.clone());
            }
        }
    }
}

#[derive(Parser)]
struct AddCommand {
    #[arg(long)]
    given: String,
    #[arg(long)]
    family: String,
    #[arg(long)]
    street: String,
    #[arg(long, value_name = "CODE")]
    postal_code: String,
    #[arg(long)]
    city: String,

    #[command(flatten)]
    optional: OptionalFields,

    /// Comma-separated tag IDs; locked and unknown tags are skipped
    #[arg(short, long, value_name = "IDS")]
    tags: Option<String>,
}

#[derive(Parser)]
struct EditCommand {
    id: i64,

    #[arg(long)]
    given: Option<String>,
    #[arg(long)]
    family: Option<String>,
    #[arg(long)]
    street: Option<String>,
    #[arg(long, value_name = "CODE")]
    postal_code: Option<String>,
    #[arg(long)]
    city: Option<String>,

    #[command(flatten)]
    optional: OptionalFields,

    /// Replace the tags with these comma-separated tag IDs ("" removes all)
    #[arg(short, long, value_name = "IDS")]
    tags: Option<String>,
}

#[derive(Parser)]
struct BulkTagCommand {
    /// Tag ID
    tag: i64,

    /// Contact IDs
    #[arg(required = true, num_args = 1..)]
    contacts: Vec<i64>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum TagCommands {
    /// List all tags, or those matching a search term
    List {
        #[arg(short, long, value_name = "TERM")]
        search: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List tags that can currently be assigned
    Available {
        #[arg(long)]
        json: bool,
    },
    /// Create a tag such as '#kunde'
    Add {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Rename a tag or change its description
    Edit {
        id: i64,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Lock a tag so it can no longer be assigned
    Lock { id: i64 },
    /// Unlock a tag
    Unlock { id: i64 },
}

/// Rejected command-line input.
#[derive(Debug, thiserror::Error)]
enum InputError {
    #[error("{0} cannot be empty")]
    Blank(&'static str),

    #[error("{field} must not exceed {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),

    #[error("'{0}' is not a valid id")]
    InvalidId(String),
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    rolodex::logging::init_subscriber(cli.verbose);

    if let Err(e) = run(&cli) {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e}");
        std::process::exit(exit_code);
    }
}

/// Rejected input and rejected directory requests are user errors;
/// storage and I/O failures are internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error.is::<InputError>()
        || error
            .downcast_ref::<DirectoryError>()
            .is_some_and(DirectoryError::is_user_error)
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::resolve(cli.database.as_deref())?;
    config::ensure_database_directory(&config.database_path)?;
    let db = Database::open(&config.database_path).context("Failed to open database")?;

    let directory = Directory::new(db);
    let mut stdout = std::io::stdout().lock();
    execute(&cli.command, &directory, &mut stdout)
}

/// Executes a command against `directory`, writing results to `out`.
///
/// Separated from `run` so that tests can use an in-memory store.
fn execute<S: Store>(
    command: &Commands,
    directory: &Directory<S>,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Commands::List(cmd) => {
            let contacts = match &cmd.city {
                Some(city) => directory.contacts_in_city(city)?,
                None => directory.list_contacts(&ListContactsOptions::from_raw(
                    cmd.search.as_deref(),
                    cmd.sort.as_deref(),
                    cmd.dir.as_deref(),
                ))?,
            };
            if cmd.json {
                write_json(out, &contacts)?;
            } else if contacts.is_empty() {
                writeln!(out, "No contacts found.")?;
            } else {
                for contact in &contacts {
                    writeln!(out, "{}", contact_line(contact))?;
                }
            }
        }
        Commands::Show(cmd) => {
            let contact = directory.contact(ContactId::new(cmd.id))?;
            if cmd.json {
                write_json(out, &contact)?;
            } else {
                write_contact(out, &contact)?;
            }
        }
        Commands::Add(cmd) => {
            let mut details = ContactDetails::new(
                &cmd.given,
                &cmd.family,
                &cmd.street,
                &cmd.postal_code,
                &cmd.city,
            );
            cmd.optional.apply(&mut details);
            validate_details(&details)?;
            let tag_ids = parse_ids(cmd.tags.as_deref().unwrap_or(""), TagId::new)?;

            let contact = directory.create_contact(details, &tag_ids)?;
            write!(out, "Contact created (id: {})", contact.id)?;
            if !contact.tags.is_empty() {
                write!(out, " with tags: {}", contact.tag_names().join(", "))?;
            }
            writeln!(out)?;
        }
        Commands::Edit(cmd) => {
            let id = ContactId::new(cmd.id);
            let mut details = directory.contact(id)?.details;
            let required = [
                (&cmd.given, &mut details.given_name),
                (&cmd.family, &mut details.family_name),
                (&cmd.street, &mut details.street),
                (&cmd.postal_code, &mut details.postal_code),
                (&cmd.city, &mut details.city),
            ];
            for (given, target) in required {
                if let Some(value) = given {
                    *target = value.clone();
                }
            }
            cmd.optional.apply(&mut details);
            validate_details(&details)?;
            let tag_ids = cmd
                .tags
                .as_deref()
                .map(|raw| parse_ids(raw, TagId::new))
                .transpose()?;

            let contact = directory.update_contact(id, details, tag_ids.as_deref())?;
            writeln!(out, "Contact updated (id: {})", contact.id)?;
        }
        Commands::Delete(cmd) => {
            directory.delete_contact(ContactId::new(cmd.id))?;
            writeln!(out, "Contact deleted (id: {})", cmd.id)?;
        }
        Commands::Assign(cmd) => {
            let contact_ids: Vec<ContactId> =
                cmd.contacts.iter().copied().map(ContactId::new).collect();
            let report = directory.assign_tag(&contact_ids, TagId::new(cmd.tag))?;
            write_report(out, "assigned", &report, cmd.json)?;
        }
        Commands::Unassign(cmd) => {
            let contact_ids: Vec<ContactId> =
                cmd.contacts.iter().copied().map(ContactId::new).collect();
            let report = directory.unassign_tag(&contact_ids, TagId::new(cmd.tag))?;
            write_report(out, "unassigned", &report, cmd.json)?;
        }
        Commands::Tag(tag_command) => execute_tag(tag_command, directory, out)?,
    }

    Ok(())
}

fn execute_tag<S: Store>(
    command: &TagCommands,
    directory: &Directory<S>,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        TagCommands::List { search, json } => {
            let tags = directory.search_tags(search.as_deref().unwrap_or(""))?;
            write_tags(out, &tags, *json)?;
        }
        TagCommands::Available { json } => {
            let tags = directory.available_tags()?;
            write_tags(out, &tags, *json)?;
        }
        TagCommands::Add { name, description } => {
            let tag = directory.create_tag(tag_draft(name, description.as_deref()))?;
            writeln!(out, "Tag created (id: {}): {}", tag.id(), tag.name())?;
        }
        TagCommands::Edit {
            id,
            name,
            description,
        } => {
            let tag =
                directory.update_tag(TagId::new(*id), tag_draft(name, description.as_deref()))?;
            writeln!(out, "Tag updated (id: {}): {}", tag.id(), tag.name())?;
        }
        TagCommands::Lock { id } => {
            let tag = directory.lock_tag(TagId::new(*id))?;
            writeln!(out, "Tag locked: {}", tag.name())?;
        }
        TagCommands::Unlock { id } => {
            let tag = directory.unlock_tag(TagId::new(*id))?;
            writeln!(out, "Tag unlocked: {}", tag.name())?;
        }
    }
    Ok(())
}

fn tag_draft(name: &str, description: Option<&str>) -> TagDraft {
    let draft = TagDraft::new(name);
    match description {
        Some(description) => draft.with_description(description),
        None => draft,
    }
}

/// Checks required fields, maximum lengths and the email format.
fn validate_details(details: &ContactDetails) -> std::result::Result<(), InputError> {
    let required = [
        ("given name", &details.given_name, 100),
        ("family name", &details.family_name, 100),
        ("street", &details.street, 200),
        ("postal code", &details.postal_code, 10),
        ("city", &details.city, 100),
    ];
    for (field, value, max) in required {
        if value.trim().is_empty() {
            return Err(InputError::Blank(field));
        }
        check_length(field, value, max)?;
    }

    let optional = [
        ("salutation", &details.salutation, 100),
        ("phone", &details.phone_primary, 30),
        ("phone2", &details.phone_secondary, 30),
        ("email", &details.email, 255),
        ("company", &details.company, 200),
    ];
    for (field, value, max) in optional {
        if let Some(value) = value {
            check_length(field, value, max)?;
        }
    }

    if let Some(email) = details.email.as_deref().map(str::trim)
        && !email.is_empty()
        && !is_plausible_email(email)
    {
        return Err(InputError::InvalidEmail(email.to_string()));
    }

    Ok(())
}

fn check_length(
    field: &'static str,
    value: &str,
    max: usize,
) -> std::result::Result<(), InputError> {
    if value.trim().chars().count() > max {
        return Err(InputError::TooLong { field, max });
    }
    Ok(())
}

/// `local@domain.tld` with no whitespace and exactly one `@`.
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// Parses comma-separated IDs, ignoring empty elements.
fn parse_ids<T>(input: &str, wrap: fn(i64) -> T) -> std::result::Result<Vec<T>, InputError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map(wrap)
                .map_err(|_| InputError::InvalidId(s.to_string()))
        })
        .collect()
}

fn write_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("Failed to serialize output")?;
    writeln!(out)?;
    Ok(())
}

fn tag_label(tag: &Tag) -> String {
    if tag.is_active() {
        tag.name().to_string()
    } else {
        format!("{} (locked)", tag.name())
    }
}

fn contact_line(contact: &Contact) -> String {
    let d = &contact.details;
    let mut line = format!(
        "{:>4}  {}, {}  {}, {} {}",
        contact.id, d.family_name, d.given_name, d.street, d.postal_code, d.city
    );
    if let Some(company) = &d.company {
        line.push_str(&format!("  ({company})"));
    }
    if !contact.tags.is_empty() {
        let labels: Vec<String> = contact.tags.iter().map(tag_label).collect();
        line.push_str(&format!("  [{}]", labels.join(", ")));
    }
    line
}

fn write_contact(out: &mut dyn Write, contact: &Contact) -> Result<()> {
    let d = &contact.details;
    writeln!(out, "Contact #{}", contact.id)?;
    if let Some(salutation) = &d.salutation {
        writeln!(out, "  Salutation: {salutation}")?;
    }
    writeln!(out, "  Name:       {} {}", d.given_name, d.family_name)?;
    writeln!(out, "  Address:    {}, {} {}", d.street, d.postal_code, d.city)?;
    let optional = [
        ("Phone", &d.phone_primary),
        ("Phone 2", &d.phone_secondary),
        ("Email", &d.email),
        ("Company", &d.company),
        ("Note", &d.note),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            writeln!(out, "  {:<11} {value}", format!("{label}:"))?;
        }
    }
    if !contact.tags.is_empty() {
        let labels: Vec<String> = contact.tags.iter().map(tag_label).collect();
        writeln!(out, "  Tags:       {}", labels.join(", "))?;
    }
    Ok(())
}

fn write_tags(out: &mut dyn Write, tags: &[Tag], json: bool) -> Result<()> {
    if json {
        return write_json(out, tags);
    }
    if tags.is_empty() {
        writeln!(out, "No tags found.")?;
        return Ok(());
    }
    for tag in tags {
        write!(out, "{:>4}  {}", tag.id(), tag_label(tag))?;
        if let Some(description) = tag.description() {
            write!(out, "  {description}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_report(
    out: &mut dyn Write,
    verb: &str,
    report: &AssignmentReport,
    json: bool,
) -> Result<()> {
    if json {
        return write_json(out, report);
    }
    writeln!(
        out,
        "Tag {verb}: {} changed, {} unchanged, {} not found",
        report.changed.len(),
        report.unchanged.len(),
        report.missing.len()
    )?;
    Ok(())
}
