//! Wire types for the VetCare API and their mapping onto the local model.
//!
//! VetCare is loose with types: ids, prices and weights arrive as numbers or
//! strings depending on the endpoint, and optional text fields come back as
//! `null`, missing or `""`. Every DTO therefore deserialises leniently and
//! the `to_*` methods normalise blanks to `None`.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::store::libsql_backend::{parse_date, parse_datetime};
use crate::store::model::{
    Appointment, AppointmentStatus, AppointmentType, Customer, GroomingServiceType,
    NewGroomingService, NewVaccine, Pet,
};

/// Vaccine name fragments that mark a yearly booster.
const ANNUAL_MARKERS: [&str; 6] = ["anual", "raiva", "v8", "v10", "múltipla", "multipla"];

// ── Lenient scalar helpers ──────────────────────────────────────────────

fn number_or_string<'de, D>(de: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(de)?.filter(|v| !v.is_null()))
}

fn lenient_id<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_or_string(de)?.and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn lenient_decimal<'de, D>(de: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_or_string(de)?.and_then(|v| match v {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(&s.trim().replace(',', ".")).ok(),
        _ => None,
    }))
}

fn lenient_f64<'de, D>(de: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_or_string(de)?.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }))
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// `DD/MM/YYYY` as used by grooming sheets, else any stored date format.
pub fn parse_vetcare_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%d/%m/%Y")
        .ok()
        .or_else(|| parse_date(s))
}

// ── Pagination envelope ─────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PageMeta {
    #[serde(default, deserialize_with = "lenient_id")]
    pub current_page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub last_page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub total_pages: Option<i64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub total: Option<i64>,
}

impl PageMeta {
    /// Whether `page` is the final one according to the metadata.
    pub fn is_last(&self, page: u32) -> bool {
        let current = self.current_page.unwrap_or(i64::from(page));
        let last = self.last_page.or(self.total_pages).unwrap_or(0);
        current >= last
    }
}

/// A list response: either a bare array or `{ "data": [...], "meta": {...} }`.
#[derive(Debug)]
pub struct Envelope {
    pub items: Vec<Value>,
    pub meta: Option<PageMeta>,
}

impl Envelope {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self { items, meta: None }),
            Value::Object(mut map) => {
                let items = match map.remove("data")? {
                    Value::Array(items) => items,
                    _ => return None,
                };
                let meta = map
                    .remove("meta")
                    .and_then(|m| serde_json::from_value(m).ok());
                Some(Self { items, meta })
            }
            _ => None,
        }
    }
}

// ── Customers ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VetCareCustomer {
    pub id: i64,
    pub nome: String,
    #[serde(default)]
    pub cpf: Option<String>,
    #[serde(default)]
    pub telefone: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub endereco: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub numero: Option<Value>,
    #[serde(default)]
    pub complemento: Option<String>,
    #[serde(default)]
    pub cidade: Option<String>,
    #[serde(default)]
    pub estado: Option<String>,
}

impl VetCareCustomer {
    /// Street, number and complement as one line (`Rua X, 10 - apto 2`).
    fn address(&self) -> Option<String> {
        let street = non_blank(self.endereco.clone())?;
        let number = match &self.numero {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let mut line = format!("{street}, {number}");
        if let Some(complement) = non_blank(self.complemento.clone()) {
            line.push_str(" - ");
            line.push_str(&complement);
        }
        Some(line.trim().trim_end_matches(',').to_string())
    }

    pub fn to_customer(&self) -> Customer {
        Customer {
            id: self.id,
            name: self.nome.trim().to_string(),
            phone: non_blank(self.telefone.clone()).or_else(|| non_blank(self.whatsapp.clone())),
            email: non_blank(self.email.clone()),
            cpf: non_blank(self.cpf.clone()),
            address: self.address(),
            city: non_blank(self.cidade.clone()),
            state: non_blank(self.estado.clone()),
        }
    }
}

// ── Pets ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OwnerRef {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VetCarePet {
    pub id: i64,
    pub nome: String,
    #[serde(default)]
    pub especie: Option<String>,
    #[serde(default)]
    pub raca: Option<String>,
    #[serde(default)]
    pub sexo: Option<String>,
    #[serde(default)]
    pub data_nascimento: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub peso: Option<f64>,
    #[serde(default)]
    pub pelagem: Option<String>,
    #[serde(default)]
    pub observacoes: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub cliente_id: Option<i64>,
    #[serde(default)]
    pub cliente: Option<OwnerRef>,
}

impl VetCarePet {
    pub fn owner_id(&self) -> Option<i64> {
        self.cliente_id
            .or_else(|| self.cliente.as_ref().and_then(|c| c.id))
    }

    /// `None` when the record has no owner.
    pub fn to_pet(&self) -> Option<Pet> {
        Some(Pet {
            id: self.id,
            customer_id: self.owner_id()?,
            name: self.nome.trim().to_string(),
            species: non_blank(self.especie.clone()),
            breed: non_blank(self.raca.clone()),
            gender: non_blank(self.sexo.clone()),
            birth_date: non_blank(self.data_nascimento.clone()),
            weight: self.peso,
            color: non_blank(self.pelagem.clone()),
            notes: non_blank(self.observacoes.clone()),
        })
    }
}

// ── Vaccinations ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub nome: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VetCareVaccination {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    pub data_aplicacao: String,
    #[serde(default)]
    pub proxima_dose: Option<String>,
    #[serde(default)]
    pub data_proxima_dose: Option<String>,
    #[serde(default)]
    pub dose: Option<String>,
    #[serde(default)]
    pub lote: Option<String>,
    #[serde(default)]
    pub observacoes: Option<String>,
    #[serde(default)]
    pub vacina_nome: Option<String>,
    #[serde(default)]
    pub veterinario_nome: Option<String>,
    #[serde(default)]
    pub vacina: Option<NamedRef>,
    #[serde(default)]
    pub veterinario: Option<NamedRef>,
}

pub fn is_annual_vaccine(name: &str) -> bool {
    let name = name.to_lowercase();
    ANNUAL_MARKERS.iter().any(|marker| name.contains(marker))
}

impl VetCareVaccination {
    pub fn vaccine_name(&self) -> Option<String> {
        non_blank(self.vacina.as_ref().and_then(|v| v.nome.clone()))
            .or_else(|| non_blank(self.vacina_nome.clone()))
    }

    /// `Err` carries the reason the record cannot be stored.
    pub fn to_vaccine(&self, pet_id: i64) -> Result<NewVaccine, &'static str> {
        let vaccine_name = self.vaccine_name().ok_or("missing vaccine name")?;
        let application_date =
            parse_date(&self.data_aplicacao).ok_or("unparseable application date")?;
        let next_dose_date = non_blank(self.proxima_dose.clone())
            .or_else(|| non_blank(self.data_proxima_dose.clone()))
            .and_then(|d| parse_date(&d));
        let veterinarian = non_blank(self.veterinario.as_ref().and_then(|v| v.nome.clone()))
            .or_else(|| non_blank(self.veterinario_nome.clone()));

        Ok(NewVaccine {
            pet_id,
            is_annual: is_annual_vaccine(&vaccine_name),
            vaccine_name,
            application_date,
            next_dose_date,
            batch_number: non_blank(self.lote.clone()),
            veterinarian,
            notes: non_blank(self.dose.clone()).or_else(|| non_blank(self.observacoes.clone())),
        })
    }
}

// ── Appointments ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VetCareAppointment {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_id")]
    pub pet_id: Option<i64>,
    pub data_hora: String,
    #[serde(default)]
    pub tipo: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub valor: Option<Decimal>,
    #[serde(default)]
    pub observacoes: Option<String>,
}

impl VetCareAppointment {
    pub fn scheduled_at(&self) -> Option<NaiveDateTime> {
        parse_datetime(&self.data_hora)
    }

    pub fn to_appointment(&self) -> Result<Appointment, &'static str> {
        Ok(Appointment {
            id: self.id,
            pet_id: self.pet_id.ok_or("missing pet id")?,
            scheduled_at: self.scheduled_at().ok_or("unparseable date")?,
            kind: AppointmentType::from_external(self.tipo.as_deref().unwrap_or_default()),
            status: AppointmentStatus::from_external(self.status.as_deref().unwrap_or_default()),
            notes: non_blank(self.observacoes.clone()),
            amount: self.valor,
        })
    }
}

// ── Grooming sheets ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VetCareGroomingRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    pub data: String,
    #[serde(default)]
    pub servicos: Option<String>,
    #[serde(default)]
    pub observacoes: Option<String>,
}

impl VetCareGroomingRecord {
    /// New sheets are stored without a plan; existing rows keep theirs.
    pub fn to_grooming_service(&self, pet_id: i64) -> Result<NewGroomingService, &'static str> {
        Ok(NewGroomingService {
            pet_id,
            service_date: parse_vetcare_date(&self.data).ok_or("unparseable date")?,
            service_type: GroomingServiceType::from_services_text(
                self.servicos.as_deref().unwrap_or_default(),
            ),
            has_plan: false,
            plan_type: None,
            notes: non_blank(self.observacoes.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[test]
    fn customer_phone_falls_back_to_whatsapp_and_address_is_joined() {
        let c: VetCareCustomer = serde_json::from_value(json!({
            "id": 7,
            "nome": " Maria Souza ",
            "telefone": "",
            "whatsapp": "(11) 98765-4321",
            "endereco": "Rua das Flores",
            "numero": 120,
            "complemento": "apto 3",
            "cidade": "São Paulo",
            "estado": null
        }))
        .unwrap();
        let customer = c.to_customer();
        assert_eq!(customer.name, "Maria Souza");
        assert_eq!(customer.phone.as_deref(), Some("(11) 98765-4321"));
        assert_eq!(customer.address.as_deref(), Some("Rua das Flores, 120 - apto 3"));
        assert_eq!(customer.state, None);

        let bare: VetCareCustomer =
            serde_json::from_value(json!({"id": 8, "nome": "João", "endereco": "Av. Brasil"}))
                .unwrap();
        assert_eq!(bare.to_customer().address.as_deref(), Some("Av. Brasil"));
        assert_eq!(bare.to_customer().phone, None);
    }

    #[test]
    fn pet_owner_comes_from_either_field() {
        let flat: VetCarePet =
            serde_json::from_value(json!({"id": 1, "nome": "Rex", "cliente_id": "5", "peso": "12,5"}))
                .unwrap();
        let pet = flat.to_pet().unwrap();
        assert_eq!(pet.customer_id, 5);
        assert_eq!(pet.weight, Some(12.5));

        let nested: VetCarePet =
            serde_json::from_value(json!({"id": 2, "nome": "Mia", "cliente": {"id": 6}})).unwrap();
        assert_eq!(nested.to_pet().unwrap().customer_id, 6);

        let orphan: VetCarePet = serde_json::from_value(json!({"id": 3, "nome": "Bob"})).unwrap();
        assert!(orphan.to_pet().is_none());
    }

    #[test]
    fn vaccination_mapping() {
        let v: VetCareVaccination = serde_json::from_value(json!({
            "id": 1,
            "data_aplicacao": "2024-03-01T00:00:00.000000Z",
            "data_proxima_dose": "2024-03-22",
            "vacina": {"nome": "V10 Importada"},
            "veterinario_nome": "Dra. Ana",
            "lote": "L-99"
        }))
        .unwrap();
        let vaccine = v.to_vaccine(10).unwrap();
        assert_eq!(vaccine.vaccine_name, "V10 Importada");
        assert!(vaccine.is_annual);
        assert_eq!(vaccine.application_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(vaccine.next_dose_date, NaiveDate::from_ymd_opt(2024, 3, 22));
        assert_eq!(vaccine.veterinarian.as_deref(), Some("Dra. Ana"));

        let unnamed: VetCareVaccination =
            serde_json::from_value(json!({"data_aplicacao": "2024-03-01"})).unwrap();
        assert_eq!(unnamed.to_vaccine(10).unwrap_err(), "missing vaccine name");
    }

    #[test]
    fn annual_markers_are_case_insensitive() {
        for name in ["Antirrábica RAIVA", "Múltipla V8", "Vacina Anual", "polivalente multipla"] {
            assert!(is_annual_vaccine(name), "{name}");
        }
        assert!(!is_annual_vaccine("Giárdia"));
        assert!(!is_annual_vaccine("Gripe Canina"));
    }

    #[test]
    fn appointment_mapping() {
        let a: VetCareAppointment = serde_json::from_value(json!({
            "id": 40,
            "pet_id": 10,
            "data_hora": "2024-03-11 14:30:00",
            "tipo": "Retorno pós-cirurgia",
            "status": "Confirmado",
            "valor": "150.00"
        }))
        .unwrap();
        let appointment = a.to_appointment().unwrap();
        assert_eq!(appointment.kind, AppointmentType::Surgery);
        assert_eq!(appointment.status, AppointmentStatus::Confirmed);
        assert_eq!(appointment.amount, Some(dec!(150.00)));
        assert_eq!(
            appointment.scheduled_at,
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap().and_hms_opt(14, 30, 0).unwrap()
        );
    }

    #[test]
    fn grooming_record_dates_are_day_first() {
        let r: VetCareGroomingRecord = serde_json::from_value(json!({
            "id": 3,
            "data": "05/02/2024",
            "servicos": "Banho, Tosa higiênica",
            "valor_total": "80,00"
        }))
        .unwrap();
        let service = r.to_grooming_service(10).unwrap();
        assert_eq!(service.service_date, NaiveDate::from_ymd_opt(2024, 2, 5).unwrap());
        assert_eq!(service.service_type, GroomingServiceType::BanhoTosa);
        assert!(!service.has_plan);
    }

    #[test]
    fn envelope_accepts_both_shapes() {
        let bare = Envelope::from_value(json!([{"id": 1}])).unwrap();
        assert_eq!(bare.items.len(), 1);
        assert!(bare.meta.is_none());

        let paged = Envelope::from_value(json!({
            "data": [{"id": 1}, {"id": 2}],
            "meta": {"current_page": 2, "last_page": 2, "total": 30}
        }))
        .unwrap();
        assert_eq!(paged.items.len(), 2);
        assert!(paged.meta.unwrap().is_last(2));

        assert!(Envelope::from_value(json!({"message": "oops"})).is_none());
    }
}
