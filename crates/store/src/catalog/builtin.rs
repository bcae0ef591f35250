//! The bundled parameter table.
//!
//! Paths use the syntax described in [`super::path`]; alternatives are
//! separated by `|`.

use crate::types::SearchParamType;

use super::path::{PathExpr, PathParseError};
use super::{CompositeComponentDef, SearchParamDef};

pub(super) struct ParamSpec {
    pub resource: &'static str,
    pub code: &'static str,
    pub kind: SearchParamType,
    pub path: &'static str,
    pub targets: &'static [&'static str],
}

impl ParamSpec {
    pub fn to_def(&self) -> Result<SearchParamDef, PathParseError> {
        Ok(SearchParamDef {
            code: self.code.to_string(),
            param_type: self.kind,
            paths: parse_alternatives(self.path)?,
            targets: self.targets.iter().map(|t| t.to_string()).collect(),
            components: Vec::new(),
        })
    }
}

pub(super) struct CompositeSpec {
    pub resource: &'static str,
    pub code: &'static str,
    pub context: &'static str,
    pub components: &'static [(&'static str, SearchParamType, &'static str)],
}

impl CompositeSpec {
    pub fn to_def(&self) -> Result<SearchParamDef, PathParseError> {
        let components = self
            .components
            .iter()
            .map(|(code, kind, path)| {
                Ok(CompositeComponentDef {
                    code: code.to_string(),
                    param_type: *kind,
                    paths: parse_alternatives(path)?,
                })
            })
            .collect::<Result<Vec<_>, PathParseError>>()?;

        Ok(SearchParamDef {
            code: self.code.to_string(),
            param_type: SearchParamType::Composite,
            paths: vec![PathExpr::parse(self.context)?],
            targets: Vec::new(),
            components,
        })
    }
}

fn parse_alternatives(path: &str) -> Result<Vec<PathExpr>, PathParseError> {
    path.split('|').map(PathExpr::parse).collect()
}

const fn spec(
    resource: &'static str,
    code: &'static str,
    kind: SearchParamType,
    path: &'static str,
    targets: &'static [&'static str],
) -> ParamSpec {
    ParamSpec {
        resource,
        code,
        kind,
        path,
        targets,
    }
}

const fn string(resource: &'static str, code: &'static str, path: &'static str) -> ParamSpec {
    spec(resource, code, SearchParamType::String, path, &[])
}

const fn token(resource: &'static str, code: &'static str, path: &'static str) -> ParamSpec {
    spec(resource, code, SearchParamType::Token, path, &[])
}

const fn date(resource: &'static str, code: &'static str, path: &'static str) -> ParamSpec {
    spec(resource, code, SearchParamType::Date, path, &[])
}

const fn quantity(resource: &'static str, code: &'static str, path: &'static str) -> ParamSpec {
    spec(resource, code, SearchParamType::Quantity, path, &[])
}

const fn uri(resource: &'static str, code: &'static str, path: &'static str) -> ParamSpec {
    spec(resource, code, SearchParamType::Uri, path, &[])
}

const fn number(resource: &'static str, code: &'static str, path: &'static str) -> ParamSpec {
    spec(resource, code, SearchParamType::Number, path, &[])
}

const fn reference(
    resource: &'static str,
    code: &'static str,
    path: &'static str,
    targets: &'static [&'static str],
) -> ParamSpec {
    spec(resource, code, SearchParamType::Reference, path, targets)
}

const SUBJECT: &[&str] = &["Patient", "Group"];
const PATIENT: &[&str] = &["Patient"];
const ENCOUNTER: &[&str] = &["Encounter"];
const ORGANIZATION: &[&str] = &["Organization"];
const LOCATION: &[&str] = &["Location"];
const CLINICIAN: &[&str] = &[
    "Practitioner",
    "PractitionerRole",
    "Organization",
    "Patient",
    "RelatedPerson",
];

/// Parameters every resource type supports.
pub(super) const COMMON_PARAMS: &[ParamSpec] = &[
    token("*", "_id", "id"),
    date("*", "_lastUpdated", "meta.lastUpdated"),
    token("*", "_tag", "meta.tag"),
    token("*", "_security", "meta.security"),
    uri("*", "_profile", "meta.profile"),
    uri("*", "_source", "meta.source"),
];

pub(super) const PARAMS: &[ParamSpec] = &[
    // Patient
    token("Patient", "identifier", "identifier"),
    string("Patient", "name", "name"),
    string("Patient", "family", "name.family"),
    string("Patient", "given", "name.given"),
    date("Patient", "birthdate", "birthDate"),
    token("Patient", "gender", "gender"),
    token("Patient", "active", "active"),
    string("Patient", "address", "address"),
    string("Patient", "address-city", "address.city"),
    string("Patient", "address-state", "address.state"),
    string("Patient", "address-postalcode", "address.postalCode"),
    string("Patient", "address-country", "address.country"),
    token("Patient", "telecom", "telecom"),
    token("Patient", "phone", "telecom[system=phone]"),
    token("Patient", "email", "telecom[system=email]"),
    token("Patient", "language", "communication.language"),
    date("Patient", "death-date", "deceasedDateTime"),
    reference(
        "Patient",
        "general-practitioner",
        "generalPractitioner",
        &["Practitioner", "PractitionerRole", "Organization"],
    ),
    reference("Patient", "organization", "managingOrganization", ORGANIZATION),
    reference("Patient", "link", "link.other", &["Patient", "RelatedPerson"]),
    // Practitioner
    token("Practitioner", "identifier", "identifier"),
    string("Practitioner", "name", "name"),
    string("Practitioner", "family", "name.family"),
    string("Practitioner", "given", "name.given"),
    token("Practitioner", "active", "active"),
    token("Practitioner", "gender", "gender"),
    token("Practitioner", "telecom", "telecom"),
    token("Practitioner", "phone", "telecom[system=phone]"),
    token("Practitioner", "email", "telecom[system=email]"),
    string("Practitioner", "address", "address"),
    // PractitionerRole
    token("PractitionerRole", "identifier", "identifier"),
    token("PractitionerRole", "active", "active"),
    token("PractitionerRole", "role", "code"),
    token("PractitionerRole", "specialty", "specialty"),
    reference(
        "PractitionerRole",
        "practitioner",
        "practitioner",
        &["Practitioner"],
    ),
    reference("PractitionerRole", "organization", "organization", ORGANIZATION),
    reference("PractitionerRole", "location", "location", LOCATION),
    // RelatedPerson
    token("RelatedPerson", "identifier", "identifier"),
    string("RelatedPerson", "name", "name"),
    token("RelatedPerson", "relationship", "relationship"),
    token("RelatedPerson", "active", "active"),
    token("RelatedPerson", "gender", "gender"),
    date("RelatedPerson", "birthdate", "birthDate"),
    reference("RelatedPerson", "patient", "patient", PATIENT),
    // Organization
    token("Organization", "identifier", "identifier"),
    string("Organization", "name", "name|alias"),
    token("Organization", "active", "active"),
    token("Organization", "type", "type"),
    string("Organization", "address", "address"),
    string("Organization", "address-city", "address.city"),
    reference("Organization", "partof", "partOf", ORGANIZATION),
    // Location
    token("Location", "identifier", "identifier"),
    string("Location", "name", "name|alias"),
    token("Location", "status", "status"),
    token("Location", "type", "type"),
    string("Location", "address", "address"),
    reference("Location", "organization", "managingOrganization", ORGANIZATION),
    reference("Location", "partof", "partOf", LOCATION),
    // Group
    token("Group", "identifier", "identifier"),
    token("Group", "type", "type"),
    token("Group", "code", "code"),
    token("Group", "actual", "actual"),
    reference(
        "Group",
        "member",
        "member.entity",
        &["Patient", "Practitioner", "PractitionerRole", "Device", "Medication", "Group"],
    ),
    // Encounter
    token("Encounter", "identifier", "identifier"),
    token("Encounter", "status", "status"),
    token("Encounter", "class", "class"),
    token("Encounter", "type", "type"),
    token("Encounter", "reason-code", "reasonCode"),
    reference("Encounter", "subject", "subject", SUBJECT),
    reference("Encounter", "patient", "subject", PATIENT),
    reference(
        "Encounter",
        "participant",
        "participant.individual",
        &["Practitioner", "PractitionerRole", "RelatedPerson"],
    ),
    reference(
        "Encounter",
        "practitioner",
        "participant.individual",
        &["Practitioner"],
    ),
    date("Encounter", "date", "period"),
    number("Encounter", "length", "length.value"),
    reference("Encounter", "location", "location.location", LOCATION),
    reference("Encounter", "service-provider", "serviceProvider", ORGANIZATION),
    reference("Encounter", "part-of", "partOf", ENCOUNTER),
    // Observation
    token("Observation", "identifier", "identifier"),
    token("Observation", "status", "status"),
    token("Observation", "code", "code"),
    token("Observation", "category", "category"),
    reference(
        "Observation",
        "subject",
        "subject",
        &["Patient", "Group", "Device", "Location"],
    ),
    reference("Observation", "patient", "subject", PATIENT),
    reference("Observation", "encounter", "encounter", ENCOUNTER),
    reference(
        "Observation",
        "performer",
        "performer",
        &[
            "Practitioner",
            "PractitionerRole",
            "Organization",
            "CareTeam",
            "Patient",
            "RelatedPerson",
        ],
    ),
    reference("Observation", "device", "device", &["Device"]),
    reference("Observation", "specimen", "specimen", &["Specimen"]),
    reference(
        "Observation",
        "has-member",
        "hasMember",
        &["Observation", "QuestionnaireResponse"],
    ),
    reference(
        "Observation",
        "based-on",
        "basedOn",
        &["CarePlan", "MedicationRequest", "ServiceRequest"],
    ),
    date("Observation", "date", "effective[x]"),
    quantity("Observation", "value-quantity", "valueQuantity"),
    string("Observation", "value-string", "valueString"),
    token("Observation", "value-concept", "valueCodeableConcept"),
    date("Observation", "value-date", "valueDateTime|valuePeriod"),
    token("Observation", "component-code", "component.code"),
    quantity(
        "Observation",
        "component-value-quantity",
        "component.valueQuantity",
    ),
    token("Observation", "data-absent-reason", "dataAbsentReason"),
    // Condition
    token("Condition", "identifier", "identifier"),
    token("Condition", "clinical-status", "clinicalStatus"),
    token("Condition", "verification-status", "verificationStatus"),
    token("Condition", "category", "category"),
    token("Condition", "code", "code"),
    token("Condition", "severity", "severity"),
    token("Condition", "body-site", "bodySite"),
    reference("Condition", "subject", "subject", SUBJECT),
    reference("Condition", "patient", "subject", PATIENT),
    reference("Condition", "encounter", "encounter", ENCOUNTER),
    reference("Condition", "asserter", "asserter", CLINICIAN),
    date("Condition", "onset-date", "onsetDateTime|onsetPeriod"),
    date("Condition", "recorded-date", "recordedDate"),
    // Procedure
    token("Procedure", "identifier", "identifier"),
    token("Procedure", "status", "status"),
    token("Procedure", "code", "code"),
    token("Procedure", "category", "category"),
    reference("Procedure", "subject", "subject", SUBJECT),
    reference("Procedure", "patient", "subject", PATIENT),
    reference("Procedure", "encounter", "encounter", ENCOUNTER),
    reference("Procedure", "performer", "performer.actor", CLINICIAN),
    reference("Procedure", "location", "location", LOCATION),
    date("Procedure", "date", "performedDateTime|performedPeriod"),
    // Medication
    token("Medication", "identifier", "identifier"),
    token("Medication", "code", "code"),
    token("Medication", "status", "status"),
    token("Medication", "form", "form"),
    reference("Medication", "manufacturer", "manufacturer", ORGANIZATION),
    // MedicationRequest
    token("MedicationRequest", "identifier", "identifier"),
    token("MedicationRequest", "status", "status"),
    token("MedicationRequest", "intent", "intent"),
    token("MedicationRequest", "category", "category"),
    token("MedicationRequest", "code", "medicationCodeableConcept"),
    reference(
        "MedicationRequest",
        "medication",
        "medicationReference",
        &["Medication"],
    ),
    reference("MedicationRequest", "subject", "subject", SUBJECT),
    reference("MedicationRequest", "patient", "subject", PATIENT),
    reference("MedicationRequest", "encounter", "encounter", ENCOUNTER),
    reference("MedicationRequest", "requester", "requester", CLINICIAN),
    reference(
        "MedicationRequest",
        "intended-performer",
        "performer",
        CLINICIAN,
    ),
    date("MedicationRequest", "authoredon", "authoredOn"),
    // DiagnosticReport
    token("DiagnosticReport", "identifier", "identifier"),
    token("DiagnosticReport", "status", "status"),
    token("DiagnosticReport", "code", "code"),
    token("DiagnosticReport", "category", "category"),
    token("DiagnosticReport", "conclusion", "conclusionCode"),
    reference("DiagnosticReport", "subject", "subject", SUBJECT),
    reference("DiagnosticReport", "patient", "subject", PATIENT),
    reference("DiagnosticReport", "encounter", "encounter", ENCOUNTER),
    reference(
        "DiagnosticReport",
        "performer",
        "performer",
        &["Practitioner", "PractitionerRole", "Organization", "CareTeam"],
    ),
    reference("DiagnosticReport", "result", "result", &["Observation"]),
    date("DiagnosticReport", "date", "effective[x]"),
    date("DiagnosticReport", "issued", "issued"),
    // Immunization
    token("Immunization", "identifier", "identifier"),
    token("Immunization", "status", "status"),
    token("Immunization", "vaccine-code", "vaccineCode"),
    reference("Immunization", "patient", "patient", PATIENT),
    reference(
        "Immunization",
        "performer",
        "performer.actor",
        &["Practitioner", "PractitionerRole", "Organization"],
    ),
    reference("Immunization", "location", "location", LOCATION),
    date("Immunization", "date", "occurrenceDateTime"),
    string("Immunization", "lot-number", "lotNumber"),
    // AllergyIntolerance
    token("AllergyIntolerance", "identifier", "identifier"),
    token("AllergyIntolerance", "clinical-status", "clinicalStatus"),
    token(
        "AllergyIntolerance",
        "verification-status",
        "verificationStatus",
    ),
    token("AllergyIntolerance", "type", "type"),
    token("AllergyIntolerance", "category", "category"),
    token("AllergyIntolerance", "criticality", "criticality"),
    token("AllergyIntolerance", "code", "code|reaction.substance"),
    reference("AllergyIntolerance", "patient", "patient", PATIENT),
    reference("AllergyIntolerance", "recorder", "recorder", CLINICIAN),
    reference("AllergyIntolerance", "asserter", "asserter", CLINICIAN),
    date("AllergyIntolerance", "date", "recordedDate"),
    // Coverage
    token("Coverage", "identifier", "identifier"),
    token("Coverage", "status", "status"),
    token("Coverage", "type", "type"),
    reference("Coverage", "beneficiary", "beneficiary", PATIENT),
    reference("Coverage", "patient", "beneficiary", PATIENT),
    reference(
        "Coverage",
        "subscriber",
        "subscriber",
        &["Patient", "RelatedPerson"],
    ),
    reference(
        "Coverage",
        "payor",
        "payor",
        &["Organization", "Patient", "RelatedPerson"],
    ),
    // Claim
    token("Claim", "identifier", "identifier"),
    token("Claim", "status", "status"),
    token("Claim", "use", "use"),
    token("Claim", "priority", "priority"),
    reference("Claim", "patient", "patient", PATIENT),
    reference(
        "Claim",
        "provider",
        "provider",
        &["Practitioner", "PractitionerRole", "Organization"],
    ),
    reference("Claim", "insurer", "insurer", ORGANIZATION),
    reference("Claim", "encounter", "item.encounter", ENCOUNTER),
    date("Claim", "created", "created"),
    // Appointment
    token("Appointment", "identifier", "identifier"),
    token("Appointment", "status", "status"),
    token("Appointment", "service-type", "serviceType"),
    reference(
        "Appointment",
        "actor",
        "participant.actor",
        &[
            "Patient",
            "Practitioner",
            "PractitionerRole",
            "RelatedPerson",
            "Device",
            "HealthcareService",
            "Location",
        ],
    ),
    reference("Appointment", "patient", "participant.actor", PATIENT),
    reference(
        "Appointment",
        "practitioner",
        "participant.actor",
        &["Practitioner"],
    ),
    reference("Appointment", "location", "participant.actor", LOCATION),
    date("Appointment", "date", "start"),
    // CarePlan
    token("CarePlan", "identifier", "identifier"),
    token("CarePlan", "status", "status"),
    token("CarePlan", "intent", "intent"),
    token("CarePlan", "category", "category"),
    reference("CarePlan", "subject", "subject", SUBJECT),
    reference("CarePlan", "patient", "subject", PATIENT),
    reference("CarePlan", "encounter", "encounter", ENCOUNTER),
    reference("CarePlan", "care-team", "careTeam", &["CareTeam"]),
    date("CarePlan", "date", "period"),
    // CareTeam
    token("CareTeam", "identifier", "identifier"),
    token("CareTeam", "status", "status"),
    token("CareTeam", "category", "category"),
    reference("CareTeam", "subject", "subject", SUBJECT),
    reference("CareTeam", "patient", "subject", PATIENT),
    reference("CareTeam", "encounter", "encounter", ENCOUNTER),
    reference(
        "CareTeam",
        "participant",
        "participant.member",
        &[
            "Practitioner",
            "PractitionerRole",
            "RelatedPerson",
            "Patient",
            "Organization",
            "CareTeam",
        ],
    ),
    date("CareTeam", "date", "period"),
    // DocumentReference
    token("DocumentReference", "identifier", "identifier"),
    token("DocumentReference", "status", "status"),
    token("DocumentReference", "type", "type"),
    token("DocumentReference", "category", "category"),
    reference(
        "DocumentReference",
        "subject",
        "subject",
        &["Patient", "Practitioner", "Group", "Device"],
    ),
    reference("DocumentReference", "patient", "subject", PATIENT),
    reference(
        "DocumentReference",
        "encounter",
        "context.encounter",
        &["Encounter", "EpisodeOfCare"],
    ),
    reference("DocumentReference", "author", "author", CLINICIAN),
    string("DocumentReference", "description", "description"),
    date("DocumentReference", "date", "date"),
    // ServiceRequest
    token("ServiceRequest", "identifier", "identifier"),
    token("ServiceRequest", "status", "status"),
    token("ServiceRequest", "intent", "intent"),
    token("ServiceRequest", "code", "code"),
    token("ServiceRequest", "category", "category"),
    reference("ServiceRequest", "subject", "subject", SUBJECT),
    reference("ServiceRequest", "patient", "subject", PATIENT),
    reference("ServiceRequest", "encounter", "encounter", ENCOUNTER),
    reference("ServiceRequest", "requester", "requester", CLINICIAN),
    reference("ServiceRequest", "performer", "performer", CLINICIAN),
    date("ServiceRequest", "authored", "authoredOn"),
    // Goal
    token("Goal", "identifier", "identifier"),
    token("Goal", "lifecycle-status", "lifecycleStatus"),
    reference("Goal", "subject", "subject", &["Patient", "Group", "Organization"]),
    reference("Goal", "patient", "subject", PATIENT),
    date("Goal", "start-date", "startDate"),
    date("Goal", "target-date", "target.dueDate"),
    // Communication
    token("Communication", "identifier", "identifier"),
    token("Communication", "status", "status"),
    token("Communication", "category", "category"),
    reference("Communication", "subject", "subject", SUBJECT),
    reference("Communication", "patient", "subject", PATIENT),
    reference("Communication", "encounter", "encounter", ENCOUNTER),
    reference("Communication", "sender", "sender", CLINICIAN),
    reference("Communication", "recipient", "recipient", CLINICIAN),
    date("Communication", "sent", "sent"),
    // Device
    token("Device", "identifier", "identifier"),
    token("Device", "status", "status"),
    token("Device", "type", "type"),
    string("Device", "manufacturer", "manufacturer"),
    string("Device", "model", "modelNumber"),
    reference("Device", "patient", "patient", PATIENT),
    reference("Device", "organization", "owner", ORGANIZATION),
    reference("Device", "location", "location", LOCATION),
    // Specimen
    token("Specimen", "identifier", "identifier"),
    token("Specimen", "type", "type"),
    token("Specimen", "status", "status"),
    reference(
        "Specimen",
        "subject",
        "subject",
        &["Patient", "Group", "Device", "Location"],
    ),
    reference("Specimen", "patient", "subject", PATIENT),
    date("Specimen", "collected", "collection.collected[x]"),
];

pub(super) const COMPOSITES: &[CompositeSpec] = &[
    CompositeSpec {
        resource: "Observation",
        code: "code-value-quantity",
        context: "",
        components: &[
            ("code", SearchParamType::Token, "code"),
            ("value-quantity", SearchParamType::Quantity, "valueQuantity"),
        ],
    },
    CompositeSpec {
        resource: "Observation",
        code: "code-value-concept",
        context: "",
        components: &[
            ("code", SearchParamType::Token, "code"),
            ("value-concept", SearchParamType::Token, "valueCodeableConcept"),
        ],
    },
    CompositeSpec {
        resource: "Observation",
        code: "code-value-date",
        context: "",
        components: &[
            ("code", SearchParamType::Token, "code"),
            ("value-date", SearchParamType::Date, "valueDateTime|valuePeriod"),
        ],
    },
    CompositeSpec {
        resource: "Observation",
        code: "component-code-value-quantity",
        context: "component",
        components: &[
            ("component-code", SearchParamType::Token, "code"),
            (
                "component-value-quantity",
                SearchParamType::Quantity,
                "valueQuantity",
            ),
        ],
    },
];

pub(super) const DEFAULT_SUMMARY: &[&str] = &["identifier", "status", "name", "code", "subject", "patient"];

pub(super) const SUMMARY_ELEMENTS: &[(&str, &[&str])] = &[
    (
        "Patient",
        &[
            "identifier",
            "active",
            "name",
            "telecom",
            "gender",
            "birthDate",
            "deceased",
            "address",
            "managingOrganization",
            "link",
        ],
    ),
    (
        "Observation",
        &[
            "identifier",
            "status",
            "category",
            "code",
            "subject",
            "encounter",
            "effective",
            "issued",
            "value",
            "dataAbsentReason",
            "interpretation",
            "component",
        ],
    ),
    (
        "Condition",
        &[
            "identifier",
            "clinicalStatus",
            "verificationStatus",
            "category",
            "severity",
            "code",
            "bodySite",
            "subject",
            "encounter",
            "onset",
            "abatement",
            "recordedDate",
        ],
    ),
    (
        "Encounter",
        &[
            "identifier",
            "status",
            "class",
            "type",
            "serviceType",
            "subject",
            "participant",
            "period",
            "location",
        ],
    ),
    (
        "Procedure",
        &[
            "identifier",
            "status",
            "code",
            "subject",
            "encounter",
            "performed",
            "performer",
        ],
    ),
    (
        "MedicationRequest",
        &[
            "identifier",
            "status",
            "intent",
            "medication",
            "subject",
            "encounter",
            "authoredOn",
            "requester",
        ],
    ),
    (
        "DiagnosticReport",
        &[
            "identifier",
            "status",
            "category",
            "code",
            "subject",
            "encounter",
            "effective",
            "issued",
            "performer",
            "result",
            "conclusion",
        ],
    ),
    (
        "Practitioner",
        &[
            "identifier",
            "active",
            "name",
            "telecom",
            "address",
            "gender",
            "birthDate",
        ],
    ),
    (
        "Organization",
        &["identifier", "active", "type", "name", "alias", "telecom", "address"],
    ),
    (
        "Location",
        &[
            "identifier",
            "status",
            "operationalStatus",
            "name",
            "alias",
            "description",
            "type",
            "telecom",
            "address",
        ],
    ),
];

type CompartmentSpec = (
    &'static str,
    &'static [(&'static str, &'static [&'static str])],
    &'static [&'static str],
);

pub(super) const COMPARTMENTS: &[CompartmentSpec] = &[
    (
        "Patient",
        &[
            ("AllergyIntolerance", &["patient", "recorder", "asserter"]),
            ("Appointment", &["actor"]),
            ("CarePlan", &["subject"]),
            ("CareTeam", &["subject", "participant"]),
            ("Claim", &["patient"]),
            ("Communication", &["subject", "sender", "recipient"]),
            ("Condition", &["subject", "asserter"]),
            ("Coverage", &["beneficiary"]),
            ("Device", &["patient"]),
            ("DiagnosticReport", &["subject"]),
            ("DocumentReference", &["subject", "author"]),
            ("Encounter", &["subject"]),
            ("Goal", &["subject"]),
            ("Group", &["member"]),
            ("Immunization", &["patient"]),
            ("MedicationRequest", &["subject"]),
            ("Observation", &["subject", "performer"]),
            ("Procedure", &["subject", "performer"]),
            ("RelatedPerson", &["patient"]),
            ("ServiceRequest", &["subject", "performer"]),
            ("Specimen", &["subject"]),
        ],
        &[
            "Encounter",
            "Practitioner",
            "PractitionerRole",
            "Organization",
            "Location",
            "Medication",
            "Device",
            "Specimen",
        ],
    ),
    (
        "Encounter",
        &[
            ("CarePlan", &["encounter"]),
            ("CareTeam", &["encounter"]),
            ("Claim", &["encounter"]),
            ("Communication", &["encounter"]),
            ("Condition", &["encounter"]),
            ("DiagnosticReport", &["encounter"]),
            ("DocumentReference", &["encounter"]),
            ("MedicationRequest", &["encounter"]),
            ("Observation", &["encounter"]),
            ("Procedure", &["encounter"]),
            ("ServiceRequest", &["encounter"]),
        ],
        &["Patient", "Practitioner", "Organization", "Location"],
    ),
    (
        "Practitioner",
        &[
            ("Appointment", &["actor"]),
            ("CareTeam", &["participant"]),
            ("Communication", &["sender", "recipient"]),
            ("DiagnosticReport", &["performer"]),
            ("Encounter", &["participant"]),
            ("MedicationRequest", &["requester"]),
            ("Observation", &["performer"]),
            ("PractitionerRole", &["practitioner"]),
            ("Procedure", &["performer"]),
        ],
        &["Organization", "Location"],
    ),
    (
        "RelatedPerson",
        &[
            ("Appointment", &["actor"]),
            ("Observation", &["performer"]),
            ("Procedure", &["performer"]),
        ],
        &["Patient"],
    ),
    (
        "Device",
        &[("Observation", &["device"])],
        &["Patient", "Organization", "Location"],
    ),
];
