//! MMSI structure: Maritime Identification Digits (MID) and station kind.
//!
//! A ship MMSI is `MIDxxxxxx`. Other station kinds embed the MID after a
//! fixed prefix: coast stations `00MIDxxxx`, group calls `0MIDxxxxx`, SAR
//! aircraft `111MIDxxx`, aids to navigation `99MIDxxxx`, auxiliary craft
//! `98MIDxxxx`. The `970`/`972`/`974` prefixes are SART, MOB and EPIRB
//! devices, which carry no flag.

use crate::types::Mmsi;

/// Lowest MMSI treated as a ship station.
pub const VALID_MMSI_MIN: Mmsi = 201_000_000;

/// One past the highest MMSI treated as a ship station.
pub const VALID_MMSI_END: Mmsi = 776_000_000;

// ---------------------------------------------------------------------------
// MID table (sorted by MID)
// ---------------------------------------------------------------------------

struct MidEntry {
    mid: u16,
    country: &'static str,
}

const MID_TABLE: &[MidEntry] = &[
    MidEntry { mid: 201, country: "Albania" },
    MidEntry { mid: 202, country: "Andorra" },
    MidEntry { mid: 203, country: "Austria" },
    MidEntry { mid: 204, country: "Portugal (Azores)" },
    MidEntry { mid: 205, country: "Belgium" },
    MidEntry { mid: 206, country: "Belarus" },
    MidEntry { mid: 207, country: "Bulgaria" },
    MidEntry { mid: 208, country: "Vatican City" },
    MidEntry { mid: 209, country: "Cyprus" },
    MidEntry { mid: 210, country: "Cyprus" },
    MidEntry { mid: 211, country: "Germany" },
    MidEntry { mid: 212, country: "Cyprus" },
    MidEntry { mid: 213, country: "Georgia" },
    MidEntry { mid: 214, country: "Moldova" },
    MidEntry { mid: 215, country: "Malta" },
    MidEntry { mid: 216, country: "Armenia" },
    MidEntry { mid: 218, country: "Germany" },
    MidEntry { mid: 219, country: "Denmark" },
    MidEntry { mid: 220, country: "Denmark" },
    MidEntry { mid: 224, country: "Spain" },
    MidEntry { mid: 225, country: "Spain" },
    MidEntry { mid: 226, country: "France" },
    MidEntry { mid: 227, country: "France" },
    MidEntry { mid: 228, country: "France" },
    MidEntry { mid: 229, country: "Malta" },
    MidEntry { mid: 230, country: "Finland" },
    MidEntry { mid: 231, country: "Faroe Islands" },
    MidEntry { mid: 232, country: "United Kingdom" },
    MidEntry { mid: 233, country: "United Kingdom" },
    MidEntry { mid: 234, country: "United Kingdom" },
    MidEntry { mid: 235, country: "United Kingdom" },
    MidEntry { mid: 236, country: "Gibraltar" },
    MidEntry { mid: 237, country: "Greece" },
    MidEntry { mid: 238, country: "Croatia" },
    MidEntry { mid: 239, country: "Greece" },
    MidEntry { mid: 240, country: "Greece" },
    MidEntry { mid: 241, country: "Greece" },
    MidEntry { mid: 242, country: "Morocco" },
    MidEntry { mid: 243, country: "Hungary" },
    MidEntry { mid: 244, country: "Netherlands" },
    MidEntry { mid: 245, country: "Netherlands" },
    MidEntry { mid: 246, country: "Netherlands" },
    MidEntry { mid: 247, country: "Italy" },
    MidEntry { mid: 248, country: "Malta" },
    MidEntry { mid: 249, country: "Malta" },
    MidEntry { mid: 250, country: "Ireland" },
    MidEntry { mid: 251, country: "Iceland" },
    MidEntry { mid: 252, country: "Liechtenstein" },
    MidEntry { mid: 253, country: "Luxembourg" },
    MidEntry { mid: 254, country: "Monaco" },
    MidEntry { mid: 255, country: "Portugal (Madeira)" },
    MidEntry { mid: 256, country: "Malta" },
    MidEntry { mid: 257, country: "Norway" },
    MidEntry { mid: 258, country: "Norway" },
    MidEntry { mid: 259, country: "Norway" },
    MidEntry { mid: 261, country: "Poland" },
    MidEntry { mid: 262, country: "Montenegro" },
    MidEntry { mid: 263, country: "Portugal" },
    MidEntry { mid: 264, country: "Romania" },
    MidEntry { mid: 265, country: "Sweden" },
    MidEntry { mid: 266, country: "Sweden" },
    MidEntry { mid: 267, country: "Slovakia" },
    MidEntry { mid: 268, country: "San Marino" },
    MidEntry { mid: 269, country: "Switzerland" },
    MidEntry { mid: 270, country: "Czech Republic" },
    MidEntry { mid: 271, country: "Turkey" },
    MidEntry { mid: 272, country: "Ukraine" },
    MidEntry { mid: 273, country: "Russia" },
    MidEntry { mid: 274, country: "North Macedonia" },
    MidEntry { mid: 275, country: "Latvia" },
    MidEntry { mid: 276, country: "Estonia" },
    MidEntry { mid: 277, country: "Lithuania" },
    MidEntry { mid: 278, country: "Slovenia" },
    MidEntry { mid: 279, country: "Serbia" },
    MidEntry { mid: 301, country: "Anguilla" },
    MidEntry { mid: 303, country: "United States (Alaska)" },
    MidEntry { mid: 304, country: "Antigua and Barbuda" },
    MidEntry { mid: 305, country: "Antigua and Barbuda" },
    MidEntry { mid: 306, country: "Curacao" },
    MidEntry { mid: 307, country: "Aruba" },
    MidEntry { mid: 308, country: "Bahamas" },
    MidEntry { mid: 309, country: "Bahamas" },
    MidEntry { mid: 310, country: "Bermuda" },
    MidEntry { mid: 311, country: "Bahamas" },
    MidEntry { mid: 312, country: "Belize" },
    MidEntry { mid: 314, country: "Barbados" },
    MidEntry { mid: 316, country: "Canada" },
    MidEntry { mid: 319, country: "Cayman Islands" },
    MidEntry { mid: 321, country: "Costa Rica" },
    MidEntry { mid: 323, country: "Cuba" },
    MidEntry { mid: 325, country: "Dominica" },
    MidEntry { mid: 327, country: "Dominican Republic" },
    MidEntry { mid: 329, country: "Guadeloupe" },
    MidEntry { mid: 330, country: "Grenada" },
    MidEntry { mid: 331, country: "Greenland" },
    MidEntry { mid: 332, country: "Guatemala" },
    MidEntry { mid: 334, country: "Honduras" },
    MidEntry { mid: 336, country: "Haiti" },
    MidEntry { mid: 338, country: "United States" },
    MidEntry { mid: 339, country: "Jamaica" },
    MidEntry { mid: 341, country: "Saint Kitts and Nevis" },
    MidEntry { mid: 343, country: "Saint Lucia" },
    MidEntry { mid: 345, country: "Mexico" },
    MidEntry { mid: 347, country: "Martinique" },
    MidEntry { mid: 348, country: "Montserrat" },
    MidEntry { mid: 350, country: "Nicaragua" },
    MidEntry { mid: 351, country: "Panama" },
    MidEntry { mid: 352, country: "Panama" },
    MidEntry { mid: 353, country: "Panama" },
    MidEntry { mid: 354, country: "Panama" },
    MidEntry { mid: 355, country: "Panama" },
    MidEntry { mid: 356, country: "Panama" },
    MidEntry { mid: 357, country: "Panama" },
    MidEntry { mid: 358, country: "Puerto Rico" },
    MidEntry { mid: 359, country: "El Salvador" },
    MidEntry { mid: 361, country: "Saint Pierre and Miquelon" },
    MidEntry { mid: 362, country: "Trinidad and Tobago" },
    MidEntry { mid: 364, country: "Turks and Caicos Islands" },
    MidEntry { mid: 366, country: "United States" },
    MidEntry { mid: 367, country: "United States" },
    MidEntry { mid: 368, country: "United States" },
    MidEntry { mid: 369, country: "United States" },
    MidEntry { mid: 370, country: "Panama" },
    MidEntry { mid: 371, country: "Panama" },
    MidEntry { mid: 372, country: "Panama" },
    MidEntry { mid: 373, country: "Panama" },
    MidEntry { mid: 374, country: "Panama" },
    MidEntry { mid: 375, country: "Saint Vincent and the Grenadines" },
    MidEntry { mid: 376, country: "Saint Vincent and the Grenadines" },
    MidEntry { mid: 377, country: "Saint Vincent and the Grenadines" },
    MidEntry { mid: 378, country: "British Virgin Islands" },
    MidEntry { mid: 379, country: "United States Virgin Islands" },
    MidEntry { mid: 401, country: "Afghanistan" },
    MidEntry { mid: 403, country: "Saudi Arabia" },
    MidEntry { mid: 405, country: "Bangladesh" },
    MidEntry { mid: 408, country: "Bahrain" },
    MidEntry { mid: 410, country: "Bhutan" },
    MidEntry { mid: 412, country: "China" },
    MidEntry { mid: 413, country: "China" },
    MidEntry { mid: 414, country: "China" },
    MidEntry { mid: 416, country: "Taiwan" },
    MidEntry { mid: 417, country: "Sri Lanka" },
    MidEntry { mid: 419, country: "India" },
    MidEntry { mid: 422, country: "Iran" },
    MidEntry { mid: 423, country: "Azerbaijan" },
    MidEntry { mid: 425, country: "Iraq" },
    MidEntry { mid: 428, country: "Israel" },
    MidEntry { mid: 431, country: "Japan" },
    MidEntry { mid: 432, country: "Japan" },
    MidEntry { mid: 434, country: "Turkmenistan" },
    MidEntry { mid: 436, country: "Kazakhstan" },
    MidEntry { mid: 437, country: "Uzbekistan" },
    MidEntry { mid: 438, country: "Jordan" },
    MidEntry { mid: 440, country: "South Korea" },
    MidEntry { mid: 441, country: "South Korea" },
    MidEntry { mid: 443, country: "Palestine" },
    MidEntry { mid: 445, country: "North Korea" },
    MidEntry { mid: 447, country: "Kuwait" },
    MidEntry { mid: 450, country: "Lebanon" },
    MidEntry { mid: 451, country: "Kyrgyzstan" },
    MidEntry { mid: 453, country: "Macao" },
    MidEntry { mid: 455, country: "Maldives" },
    MidEntry { mid: 457, country: "Mongolia" },
    MidEntry { mid: 459, country: "Nepal" },
    MidEntry { mid: 461, country: "Oman" },
    MidEntry { mid: 463, country: "Pakistan" },
    MidEntry { mid: 466, country: "Qatar" },
    MidEntry { mid: 468, country: "Syria" },
    MidEntry { mid: 470, country: "United Arab Emirates" },
    MidEntry { mid: 471, country: "United Arab Emirates" },
    MidEntry { mid: 472, country: "Tajikistan" },
    MidEntry { mid: 473, country: "Yemen" },
    MidEntry { mid: 475, country: "Yemen" },
    MidEntry { mid: 477, country: "Hong Kong" },
    MidEntry { mid: 478, country: "Bosnia and Herzegovina" },
    MidEntry { mid: 501, country: "France (Adelie Land)" },
    MidEntry { mid: 503, country: "Australia" },
    MidEntry { mid: 506, country: "Myanmar" },
    MidEntry { mid: 508, country: "Brunei" },
    MidEntry { mid: 510, country: "Micronesia" },
    MidEntry { mid: 511, country: "Palau" },
    MidEntry { mid: 512, country: "New Zealand" },
    MidEntry { mid: 514, country: "Cambodia" },
    MidEntry { mid: 515, country: "Cambodia" },
    MidEntry { mid: 516, country: "Christmas Island" },
    MidEntry { mid: 518, country: "Cook Islands" },
    MidEntry { mid: 520, country: "Fiji" },
    MidEntry { mid: 523, country: "Cocos (Keeling) Islands" },
    MidEntry { mid: 525, country: "Indonesia" },
    MidEntry { mid: 529, country: "Kiribati" },
    MidEntry { mid: 531, country: "Laos" },
    MidEntry { mid: 533, country: "Malaysia" },
    MidEntry { mid: 536, country: "Northern Mariana Islands" },
    MidEntry { mid: 538, country: "Marshall Islands" },
    MidEntry { mid: 540, country: "New Caledonia" },
    MidEntry { mid: 542, country: "Niue" },
    MidEntry { mid: 544, country: "Nauru" },
    MidEntry { mid: 546, country: "French Polynesia" },
    MidEntry { mid: 548, country: "Philippines" },
    MidEntry { mid: 553, country: "Papua New Guinea" },
    MidEntry { mid: 555, country: "Pitcairn Island" },
    MidEntry { mid: 557, country: "Solomon Islands" },
    MidEntry { mid: 559, country: "American Samoa" },
    MidEntry { mid: 561, country: "Samoa" },
    MidEntry { mid: 563, country: "Singapore" },
    MidEntry { mid: 564, country: "Singapore" },
    MidEntry { mid: 565, country: "Singapore" },
    MidEntry { mid: 566, country: "Singapore" },
    MidEntry { mid: 567, country: "Thailand" },
    MidEntry { mid: 570, country: "Tonga" },
    MidEntry { mid: 572, country: "Tuvalu" },
    MidEntry { mid: 574, country: "Vietnam" },
    MidEntry { mid: 576, country: "Vanuatu" },
    MidEntry { mid: 577, country: "Vanuatu" },
    MidEntry { mid: 578, country: "Wallis and Futuna" },
    MidEntry { mid: 601, country: "South Africa" },
    MidEntry { mid: 603, country: "Angola" },
    MidEntry { mid: 605, country: "Algeria" },
    MidEntry { mid: 607, country: "France (Saint Paul and Amsterdam)" },
    MidEntry { mid: 608, country: "United Kingdom (Ascension Island)" },
    MidEntry { mid: 609, country: "Burundi" },
    MidEntry { mid: 610, country: "Benin" },
    MidEntry { mid: 611, country: "Botswana" },
    MidEntry { mid: 612, country: "Central African Republic" },
    MidEntry { mid: 613, country: "Cameroon" },
    MidEntry { mid: 615, country: "Congo" },
    MidEntry { mid: 616, country: "Comoros" },
    MidEntry { mid: 617, country: "Cabo Verde" },
    MidEntry { mid: 618, country: "France (Crozet Archipelago)" },
    MidEntry { mid: 619, country: "Ivory Coast" },
    MidEntry { mid: 620, country: "Comoros" },
    MidEntry { mid: 621, country: "Djibouti" },
    MidEntry { mid: 622, country: "Egypt" },
    MidEntry { mid: 624, country: "Ethiopia" },
    MidEntry { mid: 625, country: "Eritrea" },
    MidEntry { mid: 626, country: "Gabon" },
    MidEntry { mid: 627, country: "Ghana" },
    MidEntry { mid: 629, country: "Gambia" },
    MidEntry { mid: 630, country: "Guinea-Bissau" },
    MidEntry { mid: 631, country: "Equatorial Guinea" },
    MidEntry { mid: 632, country: "Guinea" },
    MidEntry { mid: 633, country: "Burkina Faso" },
    MidEntry { mid: 634, country: "Kenya" },
    MidEntry { mid: 635, country: "France (Kerguelen Islands)" },
    MidEntry { mid: 636, country: "Liberia" },
    MidEntry { mid: 637, country: "Liberia" },
    MidEntry { mid: 638, country: "South Sudan" },
    MidEntry { mid: 642, country: "Libya" },
    MidEntry { mid: 644, country: "Lesotho" },
    MidEntry { mid: 645, country: "Mauritius" },
    MidEntry { mid: 647, country: "Madagascar" },
    MidEntry { mid: 649, country: "Mali" },
    MidEntry { mid: 650, country: "Mozambique" },
    MidEntry { mid: 654, country: "Mauritania" },
    MidEntry { mid: 655, country: "Malawi" },
    MidEntry { mid: 656, country: "Niger" },
    MidEntry { mid: 657, country: "Nigeria" },
    MidEntry { mid: 659, country: "Namibia" },
    MidEntry { mid: 660, country: "France (Reunion)" },
    MidEntry { mid: 661, country: "Rwanda" },
    MidEntry { mid: 662, country: "Sudan" },
    MidEntry { mid: 663, country: "Senegal" },
    MidEntry { mid: 664, country: "Seychelles" },
    MidEntry { mid: 665, country: "Saint Helena" },
    MidEntry { mid: 666, country: "Somalia" },
    MidEntry { mid: 667, country: "Sierra Leone" },
    MidEntry { mid: 668, country: "Sao Tome and Principe" },
    MidEntry { mid: 669, country: "Eswatini" },
    MidEntry { mid: 670, country: "Chad" },
    MidEntry { mid: 671, country: "Togo" },
    MidEntry { mid: 672, country: "Tunisia" },
    MidEntry { mid: 674, country: "Tanzania" },
    MidEntry { mid: 675, country: "Uganda" },
    MidEntry { mid: 676, country: "Democratic Republic of the Congo" },
    MidEntry { mid: 677, country: "Tanzania" },
    MidEntry { mid: 678, country: "Zambia" },
    MidEntry { mid: 679, country: "Zimbabwe" },
    MidEntry { mid: 701, country: "Argentina" },
    MidEntry { mid: 710, country: "Brazil" },
    MidEntry { mid: 720, country: "Bolivia" },
    MidEntry { mid: 725, country: "Chile" },
    MidEntry { mid: 730, country: "Colombia" },
    MidEntry { mid: 735, country: "Ecuador" },
    MidEntry { mid: 740, country: "Falkland Islands" },
    MidEntry { mid: 745, country: "French Guiana" },
    MidEntry { mid: 750, country: "Guyana" },
    MidEntry { mid: 755, country: "Paraguay" },
    MidEntry { mid: 760, country: "Peru" },
    MidEntry { mid: 765, country: "Suriname" },
    MidEntry { mid: 770, country: "Uruguay" },
    MidEntry { mid: 775, country: "Venezuela" },
];

/// Look up the flag state for a three-digit MID.
pub fn lookup_mid(mid: u16) -> Option<&'static str> {
    MID_TABLE
        .binary_search_by_key(&mid, |e| e.mid)
        .ok()
        .map(|i| MID_TABLE[i].country)
}

// ---------------------------------------------------------------------------
// Station classification
// ---------------------------------------------------------------------------

/// What kind of station an MMSI identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationKind {
    Ship,
    GroupCall,
    CoastStation,
    SarAircraft,
    AidToNavigation,
    AuxiliaryCraft,
    Sart,
    ManOverboard,
    Epirb,
    Unknown,
}

/// Classify an MMSI by its prefix.
pub fn station_kind(mmsi: Mmsi) -> StationKind {
    if mmsi > 999_999_999 {
        return StationKind::Unknown;
    }
    let digits = format!("{mmsi:09}");
    match digits.as_bytes() {
        [b'9', b'7', b'0', ..] => StationKind::Sart,
        [b'9', b'7', b'2', ..] => StationKind::ManOverboard,
        [b'9', b'7', b'4', ..] => StationKind::Epirb,
        [b'9', b'9', ..] => StationKind::AidToNavigation,
        [b'9', b'8', ..] => StationKind::AuxiliaryCraft,
        [b'1', b'1', b'1', ..] => StationKind::SarAircraft,
        [b'0', b'0', ..] => StationKind::CoastStation,
        [b'0', ..] => StationKind::GroupCall,
        [b'2'..=b'7', ..] => StationKind::Ship,
        _ => StationKind::Unknown,
    }
}

/// Extract the MID for the station kinds that carry one.
pub fn mid_of(mmsi: Mmsi) -> Option<u16> {
    let digits = format!("{mmsi:09}");
    let start = match station_kind(mmsi) {
        StationKind::Ship => 0,
        StationKind::GroupCall => 1,
        StationKind::CoastStation | StationKind::AidToNavigation | StationKind::AuxiliaryCraft => 2,
        StationKind::SarAircraft => 3,
        _ => return None,
    };
    digits.get(start..start + 3)?.parse().ok()
}

/// Flag state implied by an MMSI, if its MID is allocated.
pub fn flag_from_mmsi(mmsi: Mmsi) -> Option<&'static str> {
    mid_of(mmsi).and_then(lookup_mid)
}

/// True for MMSIs in the ship-station range.
pub fn is_valid_mmsi(mmsi: Mmsi) -> bool {
    (VALID_MMSI_MIN..VALID_MMSI_END).contains(&mmsi)
}
